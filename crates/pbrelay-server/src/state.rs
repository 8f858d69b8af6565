use crate::config::{MetricsAccess, ResponseMode};
use crate::dispatcher::Dispatcher;

/// Shared, read-only application state. Built once at startup.
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub response_mode: ResponseMode,
    pub metrics: MetricsAccess,
}
