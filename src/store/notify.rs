//! User-facing alerts raised by the store.

/// Receives blocking, user-facing alerts.
pub trait Notifier: Send + Sync {
    /// Show `message` to the user.
    fn alert(&self, message: &str);
}

/// Notifier that only logs the alert.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn alert(&self, message: &str) {
        tracing::warn!(alert = message, "user alert");
    }
}
