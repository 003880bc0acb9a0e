//! Eligibility evaluation.
//!
//! Decides whether a request may be served from, or written to, the page cache. The checks run
//! in a fixed order and stop at the first failure.

use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use tracing::warn;

use super::context::{ControllerKind, RequestContext};
use super::maintenance::MaintenanceStatusProvider;

/// The reason a request bypasses the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    /// Development or profiling mode is on.
    DebugMode,
    /// Not a storefront page (back office, module endpoint, or unknown controller).
    NotFrontController,
    /// Partial content requested asynchronously.
    Ajax,
    /// Anything other than GET.
    UnsafeMethod,
    /// Storefront disabled for maintenance.
    Maintenance,
    /// A customer is logged in.
    Authenticated,
    /// The cart holds products.
    CartNotEmpty,
    /// Checkout controllers are never cached.
    ExcludedController,
    /// The cache has been deactivated.
    Inactive,
}

impl Bypass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bypass::DebugMode => "debug_mode",
            Bypass::NotFrontController => "not_front_controller",
            Bypass::Ajax => "ajax",
            Bypass::UnsafeMethod => "unsafe_method",
            Bypass::Maintenance => "maintenance",
            Bypass::Authenticated => "authenticated",
            Bypass::CartNotEmpty => "cart_not_empty",
            Bypass::ExcludedController => "excluded_controller",
            Bypass::Inactive => "inactive",
        }
    }
}

impl fmt::Display for Bypass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the eligibility predicate chain.
#[derive(Clone)]
pub struct EligibilityEvaluator {
    check_maintenance: bool,
    maintenance: Arc<dyn MaintenanceStatusProvider>,
}

impl EligibilityEvaluator {
    pub fn new(check_maintenance: bool, maintenance: Arc<dyn MaintenanceStatusProvider>) -> Self {
        Self {
            check_maintenance,
            maintenance,
        }
    }

    pub fn is_eligible(&self, ctx: &RequestContext) -> bool {
        self.evaluate(ctx).is_ok()
    }

    /// Returns the first failing predicate, if any.
    pub fn evaluate(&self, ctx: &RequestContext) -> Result<(), Bypass> {
        if ctx.storefront().debug {
            return Err(Bypass::DebugMode);
        }

        if !ctx
            .controller()
            .is_some_and(|controller| controller.kind == ControllerKind::Front)
        {
            return Err(Bypass::NotFrontController);
        }

        if ctx.is_ajax() {
            return Err(Bypass::Ajax);
        }

        if *ctx.method() != Method::GET {
            return Err(Bypass::UnsafeMethod);
        }

        if self.check_maintenance && self.storefront_disabled(ctx) {
            return Err(Bypass::Maintenance);
        }

        if ctx.session().is_authenticated() {
            return Err(Bypass::Authenticated);
        }

        if ctx.session().has_cart_items() {
            return Err(Bypass::CartNotEmpty);
        }

        Ok(())
    }

    /// True when the controller rendered a maintenance page. Provider failures read as false.
    pub fn in_maintenance(&self, ctx: &RequestContext) -> bool {
        match self.maintenance.in_maintenance(ctx) {
            Ok(flag) => flag,
            Err(err) => {
                warn!(error = %err, "maintenance state unreadable, assuming storefront is open");
                false
            }
        }
    }

    fn storefront_disabled(&self, ctx: &RequestContext) -> bool {
        match self.maintenance.storefront_disabled(ctx) {
            Ok(flag) => flag,
            Err(err) => {
                warn!(error = %err, "shop status unreadable, skipping maintenance check");
                false
            }
        }
    }
}
