use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::debug;

use super::controller::SessionController;

/// Wall-clock cadence of the countdown in production.
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Background task that feeds ticks to a shared [`SessionController`].
///
/// Spawn it once the session goes `Active`. The task exits on its own as
/// soon as a tick reports the clock stopped, which covers both expiry and
/// a user-driven finish racing the timer; ticks that lose that race are
/// inert. Dropping the driver aborts the task.
pub struct CountdownDriver {
    handle: JoinHandle<()>,
}

impl CountdownDriver {
    /// Starts ticking the controller every `period`. Tests pass a short
    /// period; production uses [`TICK_PERIOD`].
    #[must_use]
    pub fn spawn(controller: Arc<Mutex<SessionController>>, period: Duration) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                sleep(period).await;
                let report = controller.lock().await.tick().await;
                if report.clock_stopped {
                    debug!(
                        remaining_seconds = report.remaining_seconds,
                        "countdown finished"
                    );
                    break;
                }
            }
        });
        Self { handle }
    }

    /// True once the tick task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Aborts the tick task without waiting for it.
    pub fn stop(&self) {
        self.handle.abort();
    }

    /// Waits for the tick task to exit on its own.
    pub async fn join(&mut self) {
        let _ = (&mut self.handle).await;
    }
}

impl Drop for CountdownDriver {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
