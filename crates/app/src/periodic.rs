//! Periodic background tasks driven by a ticker and stopped by a
//! cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// When the first run happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstRun {
    Immediately,
    AfterPeriod,
}

/// Spawn `task` every `period` until `token` is cancelled.
///
/// Runs never overlap; a slow run delays the next tick instead of bunching
/// up missed ones. Cancellation also interrupts a run in progress.
pub fn spawn<F, Fut>(
    name: String,
    period: Duration,
    first_run: FirstRun,
    token: CancellationToken,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let start = match first_run {
            FirstRun::Immediately => Instant::now(),
            FirstRun::AfterPeriod => Instant::now() + period,
        };
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(task = %name, period_secs = period.as_secs(), "periodic task started");
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            tokio::select! {
                () = token.cancelled() => break,
                () = task() => {}
            }
        }
        tracing::debug!(task = %name, "periodic task stopped");
    })
}
