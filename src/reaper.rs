/// Background sweep that closes idle farming sessions.
///
/// One tokio task ticks at a fixed period (5s by default) regardless of how
/// many deaths arrive. Each tick is isolated: a panic inside a sweep is
/// caught and logged, and the next tick runs as normal.
use crate::engine::{panic_message, CorrelationEngine};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub struct SessionReaper {
    engine: Arc<CorrelationEngine>,
    period: Duration,
}

impl SessionReaper {
    pub fn new(engine: Arc<CorrelationEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Runs one sweep. Returns the number of sessions evicted (0 if the
    /// sweep panicked).
    pub fn sweep(&self) -> usize {
        match catch_unwind(AssertUnwindSafe(|| self.engine.cleanup_idle_sessions())) {
            Ok(evicted) => evicted,
            Err(payload) => {
                tracing::error!("Error in farming monitor: {}", panic_message(&*payload));
                0
            }
        }
    }

    /// Starts the periodic sweep. The first sweep runs one period after start.
    /// Abort the returned handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.period, self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::info!("Farming monitor started with {:?} check interval", self.period);

            loop {
                ticker.tick().await;
                let evicted = self.sweep();
                if evicted > 0 {
                    tracing::debug!("Reaper evicted {} idle session(s)", evicted);
                }
            }
        })
    }
}
