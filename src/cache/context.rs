//! Per-request snapshot consumed by the cache gate.
//!
//! The host application describes each request by inserting [`Storefront`], [`Controller`] and
//! [`SessionState`] into the request extensions before the cache layer runs. Handlers may attach
//! a refreshed [`SessionState`] to the response when the session changes mid-request (for
//! example a product added to the cart); the completion-time check then observes it.

use std::fmt;

use axum::{
    body::Body,
    http::{HeaderMap, Method, Request, Uri},
};

const AJAX_HEADER: &str = "x-requested-with";
const AJAX_HEADER_VALUE: &str = "XMLHttpRequest";

/// Device class used when mobile and desktop pages are cached separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    Desktop,
    Tablet,
    Mobile,
}

impl DeviceClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Tablet => "tablet",
            DeviceClass::Mobile => "mobile",
        }
    }
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a controller renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    /// Customer-facing storefront pages.
    Front,
    /// Back-office pages.
    Admin,
    /// Module endpoints and other non-page controllers.
    Module,
}

/// The controller resolved by the host dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controller {
    pub name: String,
    pub kind: ControllerKind,
}

impl Controller {
    pub fn new(name: impl Into<String>, kind: ControllerKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn front(name: impl Into<String>) -> Self {
        Self::new(name, ControllerKind::Front)
    }
}

/// Locale, shop and device resolved for the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Storefront {
    pub locale_id: Option<String>,
    pub store_id: Option<String>,
    pub device: Option<DeviceClass>,
    /// Development or profiling mode is active.
    pub debug: bool,
}

/// Session-derived state that personalizes pages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Authenticated customer identity, if any.
    pub principal: Option<String>,
    /// Number of products in the cart; `None` when no cart exists.
    pub cart_items: Option<u32>,
}

impl SessionState {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn has_cart_items(&self) -> bool {
        self.cart_items.is_some_and(|count| count > 0)
    }
}

/// Immutable view of a request as far as caching is concerned.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path_and_query: String,
    ajax: bool,
    storefront: Storefront,
    controller: Option<Controller>,
    session: SessionState,
}

impl RequestContext {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            ajax: false,
            storefront: Storefront::default(),
            controller: None,
            session: SessionState::default(),
        }
    }

    /// Build a context from an inbound request and the extensions the host attached to it.
    pub fn from_request(request: &Request<Body>) -> Self {
        let extensions = request.extensions();
        Self {
            method: request.method().clone(),
            path_and_query: path_and_query(request.uri()),
            ajax: is_ajax(request.headers(), request.uri()),
            storefront: extensions.get::<Storefront>().cloned().unwrap_or_default(),
            controller: extensions.get::<Controller>().cloned(),
            session: extensions.get::<SessionState>().cloned().unwrap_or_default(),
        }
    }

    pub fn with_ajax(mut self, ajax: bool) -> Self {
        self.ajax = ajax;
        self
    }

    pub fn with_storefront(mut self, storefront: Storefront) -> Self {
        self.storefront = storefront;
        self
    }

    pub fn with_controller(mut self, controller: Controller) -> Self {
        self.controller = Some(controller);
        self
    }

    pub fn with_session(mut self, session: SessionState) -> Self {
        self.session = session;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_and_query(&self) -> &str {
        &self.path_and_query
    }

    pub fn is_ajax(&self) -> bool {
        self.ajax
    }

    pub fn storefront(&self) -> &Storefront {
        &self.storefront
    }

    pub fn controller(&self) -> Option<&Controller> {
        self.controller.as_ref()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }
}

fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn is_ajax(headers: &HeaderMap, uri: &Uri) -> bool {
    let header_flag = headers
        .get(AJAX_HEADER)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case(AJAX_HEADER_VALUE));

    header_flag || query_flag(uri.query().unwrap_or(""), "ajax")
}

fn query_flag(query: &str, name: &str) -> bool {
    query
        .split('&')
        .filter_map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next()?;
            (key == name).then(|| parts.next().unwrap_or(""))
        })
        .any(|value| !matches!(value, "" | "0" | "false"))
}
