//! A channel that only logs events via `tracing`. Always enabled; useful
//! as the sole channel in tests and local runs where no webhook is
//! configured.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ChannelError;
use crate::events::{NotifyEvent, Severity};
use crate::NotifyChannel;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingChannel;

#[async_trait]
impl NotifyChannel for LoggingChannel {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn enabled(&self) -> bool {
        true
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        match event.severity() {
            Severity::Critical | Severity::Warning => {
                warn!(title = %event.title(), description = %event.description(), "notification");
            }
            Severity::Info => {
                info!(title = %event.title(), description = %event.description(), "notification");
            }
        }
        Ok(())
    }
}
