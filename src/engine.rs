/// Farming correlation engine: the "brain" of the pipeline.
///
/// Every death passes through `on_death`, which
///   1. folds the kill into the killer's session for that victim kind,
///   2. fires the one-time "farming started" notice when a session reaches
///      the kill threshold,
///   3. tells the caller whether the raw death message should still be posted
///      (it is suppressed while a notified session stays active),
///   4. appends the death to the history log, running a session cleanup
///      every `cleanup_every` deaths in case the reaper falls behind.
///
/// `on_death` is safe to call from many producers at once. Session state
/// lives in the `SessionStore`; nothing here holds a session across calls.
use crate::{
    clock::Clock,
    config::{MessageTemplates, Thresholds},
    event::DeathEvent,
    history::HistoryLog,
    session::{FarmingSession, SessionKey, SessionStore},
    sink::{Channel, NotificationSink},
    xp::XpTable,
};
use anyhow::Result;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use uuid::Uuid;

/// What one kill observed about its session, captured under the entry lock.
struct KillObservation {
    previous_kill_time: Option<u64>,
    was_notified:       bool,
    /// Snapshot taken when this kill claimed the farming notice.
    claimed:            Option<FarmingSession>,
}

pub struct CorrelationEngine {
    sessions:   SessionStore,
    history:    HistoryLog,
    sink:       Arc<dyn NotificationSink>,
    clock:      Arc<dyn Clock>,
    xp:         XpTable,
    thresholds: Thresholds,
    templates:  MessageTemplates,
}

impl CorrelationEngine {
    pub fn new(
        sink:       Arc<dyn NotificationSink>,
        clock:      Arc<dyn Clock>,
        xp:         XpTable,
        thresholds: Thresholds,
        templates:  MessageTemplates,
    ) -> Self {
        Self {
            sessions: SessionStore::new(),
            history: HistoryLog::new(thresholds.history_capacity),
            sink,
            clock,
            xp,
            thresholds,
            templates,
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Processes one death. Returns whether the caller should still post the
    /// raw death message downstream.
    pub fn on_death(&self, event: DeathEvent) -> bool {
        let event = Arc::new(event);
        let forward = self.correlate(&event);

        let seq = self.history.append(Arc::clone(&event));
        let every = self.thresholds.cleanup_every;
        if every > 0 && seq % every == 0 {
            tracing::debug!("Death #{} — running periodic session cleanup", seq);
            self.cleanup_idle_sessions();
        }

        forward
    }

    fn correlate(&self, event: &DeathEvent) -> bool {
        let Some(key) = SessionKey::for_event(event) else {
            return true; // Nobody to correlate against
        };

        let now          = self.clock.now_secs();
        let notify_after = self.thresholds.notify_after_kills;

        let seen = self.sessions.get_or_create(
            key.clone(),
            || FarmingSession::start(event, now),
            |session, created| {
                let previous_kill_time = (!created).then_some(session.last_kill_time);
                let was_notified       = session.notified;
                if !created {
                    session.record_kill(now);
                }
                let claimed = session
                    .claim_notification(notify_after)
                    .then(|| session.clone());
                KillObservation { previous_kill_time, was_notified, claimed }
            },
        );

        if let Some(session) = seen.claimed {
            tracing::debug!("Session {} reached {} kills — farming", key, session.kill_count);
            self.notify_farming_started(&session);
        }

        // The kill that crosses the threshold still goes out; later kills
        // are swallowed while the session stays active.
        let active = seen
            .previous_kill_time
            .is_some_and(|t| now.saturating_sub(t) <= self.thresholds.idle_timeout_secs);
        if seen.was_notified && active {
            tracing::trace!("Suppressing death message for farming session {}", key);
            return false;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Evicts every session idle longer than the timeout and posts a summary
    /// for each one that had been flagged as farming. Returns how many
    /// sessions were evicted. Safe to call at any time, from any thread.
    ///
    /// Each eviction is closed on its own: a summary send that panics is
    /// logged and the remaining sessions are still closed normally.
    pub fn cleanup_idle_sessions(&self) -> usize {
        let now  = self.clock.now_secs();
        let idle = self.thresholds.idle_timeout_secs;

        self.sessions.remove_if(
            |_, session| !session.is_active(now, idle),
            |key, session| self.close_session(&key, &session),
        )
    }

    fn close_session(&self, key: &SessionKey, session: &FarmingSession) {
        if session.notified {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.send_summary(session))) {
                tracing::error!(
                    "Summary for farming session {} failed: {}",
                    key,
                    panic_message(&*payload)
                );
            }
        }
        tracing::debug!(
            "Completed farming session {} ({} kills in {})",
            key,
            session.kill_count,
            session.formatted_duration()
        );
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// History-only burst check: has the same killer killed something with
    /// the same name enough times within the burst window?
    pub fn is_farming(&self, record: &DeathEvent) -> bool {
        if self.history.is_empty() {
            return false;
        }
        let needed = self.thresholds.burst_threshold();
        let since  = self.clock.now_secs().saturating_sub(self.thresholds.burst_window_secs);
        self.history.count_matching(record, since, needed) >= needed
    }

    pub fn deaths_of(&self, victim_id: Uuid) -> Vec<Arc<DeathEvent>> {
        self.history.deaths_of(victim_id)
    }

    pub fn recent_deaths(&self, n: usize) -> Vec<Arc<DeathEvent>> {
        self.history.recent(n)
    }

    pub fn session(&self, key: &SessionKey) -> Option<FarmingSession> {
        self.sessions.get(key)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    fn notify_farming_started(&self, session: &FarmingSession) {
        let message = self
            .templates
            .farming_started(&session.killer_name, &session.victim_name);
        match self.sink.send(&message, Channel::SecondaryFeed) {
            Ok(()) => tracing::info!(
                "Farming notification sent: {} farming {}",
                session.killer_name,
                session.victim_name
            ),
            Err(e) => tracing::error!("Failed to send farming notification: {}", e),
        }
    }

    fn send_summary(&self, session: &FarmingSession) {
        let message = self.templates.farming_complete(&session.summary(&self.xp));
        match self.sink.send(&message, Channel::SecondaryFeed) {
            Ok(()) => tracing::info!(
                "Farming summary sent: {} completed farming {} ({} total kills)",
                session.killer_name,
                session.victim_name,
                session.kill_count
            ),
            Err(e) => tracing::error!("Failed to send farming summary: {}", e),
        }
    }

    /// Posts a raw death message to the kill feed.
    pub fn forward_death(&self, event: &DeathEvent) {
        let message = self.templates.death(&event.describe());
        if let Err(e) = self.sink.send(&message, Channel::SecondaryFeed) {
            tracing::warn!("Failed to send death message: {}", e);
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

// ---------------------------------------------------------------------------
// Main engine task
// ---------------------------------------------------------------------------

/// Drains parsed deaths from the feed and posts the ones that survive
/// farming suppression.
pub async fn run(engine: Arc<CorrelationEngine>, mut event_rx: Receiver<DeathEvent>) -> Result<()> {
    while let Some(event) = event_rx.recv().await {
        let raw = event.clone();
        if engine.on_death(event) {
            engine.forward_death(&raw);
        }
    }
    tracing::info!("Death feed closed — engine exiting");
    Ok(())
}
