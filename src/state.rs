use std::sync::Arc;

use crate::database::ConnectionRegistry;
use crate::outbox::EmailOutbox;

/// Shared application state: the connection registry and the email outbox,
/// both constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConnectionRegistry>,
    pub outbox: EmailOutbox,
}
