//! Notifier that reports status messages through `tracing`.

use api_dispatch_core::environment::Notifier;

/// Logs success messages at `info` and error messages at `warn`.
///
/// Useful for headless clients and services where there is no UI to show
/// status messages on.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_success(&self, message: &str) {
        tracing::info!(target: "api_dispatch::notify", status = message, "success");
    }

    fn show_error(&self, message: &str) {
        tracing::warn!(target: "api_dispatch::notify", status = message, "error");
    }
}
