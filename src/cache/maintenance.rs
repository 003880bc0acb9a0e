//! Maintenance status reported by the host application.
//!
//! The cache never inspects host internals; the integration layer answers through
//! [`MaintenanceStatusProvider`].

use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;

use super::context::RequestContext;

#[derive(Debug, Error)]
pub enum MaintenanceError {
    #[error("maintenance status unavailable: {0}")]
    Unavailable(String),
}

impl MaintenanceError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }
}

/// Answers whether the storefront is currently closed for maintenance.
pub trait MaintenanceStatusProvider: Send + Sync {
    /// The shop is disabled by configuration (storefront closed to visitors).
    fn storefront_disabled(&self, ctx: &RequestContext) -> Result<bool, MaintenanceError>;

    /// The controller serving this request rendered a maintenance page.
    fn in_maintenance(&self, ctx: &RequestContext) -> Result<bool, MaintenanceError>;
}

/// Process-wide maintenance toggle.
#[derive(Debug, Default)]
pub struct MaintenanceSwitch {
    enabled: AtomicBool,
}

impl MaintenanceSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl MaintenanceStatusProvider for MaintenanceSwitch {
    fn storefront_disabled(&self, _ctx: &RequestContext) -> Result<bool, MaintenanceError> {
        Ok(self.is_enabled())
    }

    fn in_maintenance(&self, _ctx: &RequestContext) -> Result<bool, MaintenanceError> {
        Ok(self.is_enabled())
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;

    use super::*;

    #[test]
    fn switch_reports_current_state() {
        let ctx = RequestContext::new(Method::GET, "/");
        let switch = MaintenanceSwitch::default();
        assert!(!switch.storefront_disabled(&ctx).unwrap());

        switch.set(true);
        assert!(switch.storefront_disabled(&ctx).unwrap());
        assert!(switch.in_maintenance(&ctx).unwrap());
    }
}
