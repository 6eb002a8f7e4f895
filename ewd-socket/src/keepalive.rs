//! Keep-alive timer.
//!
//! Sends `{type: "keepAlive", message: "1"}` on a fixed cadence so idle
//! sessions are not reaped by the back end. The task is tied to a handle:
//! dropping or stopping the handle cancels it.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use ewd_core::constants::{fields, message_types};
use ewd_core::error::{EwdError, EwdResult};

use crate::sender::{OutboundRequest, OutboundSender, SendOutcome};

/// Handle to a running keep-alive task.
pub struct KeepAlive {
    task: JoinHandle<()>,
    interval: Duration,
}

impl KeepAlive {
    /// Start sending keep-alives through `sender` every `interval`.
    ///
    /// The first keep-alive goes out one full interval after the start.
    pub fn spawn(sender: OutboundSender, interval: Duration) -> EwdResult<Self> {
        if interval.is_zero() {
            return Err(EwdError::Config("keep-alive interval must be non-zero".into()));
        }
        let runtime = Handle::try_current()
            .map_err(|_| EwdError::Internal("keep-alive requires a tokio runtime".into()))?;

        let task = runtime.spawn(async move {
            loop {
                sleep(interval).await;
                let ping = OutboundRequest::new(message_types::KEEP_ALIVE).param(fields::MESSAGE, "1");
                match sender.send(ping) {
                    Ok(SendOutcome::Disconnected) => debug!("keep-alive skipped: socket disconnected"),
                    Ok(_) => trace!("keep-alive sent"),
                    Err(EwdError::NotRegistered) => {
                        debug!("keep-alive stopped: registration replaced");
                        break;
                    }
                    Err(e) => warn!("keep-alive failed: {e}"),
                }
            }
        });

        info!("keep-alive started (every {}s)", interval.as_secs());
        Ok(Self { task, interval })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the timer.
    pub fn stop(self) {
        debug!("keep-alive stopped");
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.task.abort();
    }
}
