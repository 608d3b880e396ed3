/// Farming sessions and the concurrent store that owns them.
///
/// A session aggregates repeated kills of one victim kind by one killer.
/// Producers and the reaper only ever touch sessions through `SessionStore`,
/// whose operations run under the owning shard's lock: a caller can never see
/// a kill count that was bumped without its kill time, or vice versa.
use crate::{event::DeathEvent, xp::XpTable};
use dashmap::{mapref::entry::Entry, DashMap};
use std::fmt;

// ---------------------------------------------------------------------------
// SessionKey
// ---------------------------------------------------------------------------

/// "killer identity : victim kind"
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey(String);

impl SessionKey {
    /// `None` when the event has no killer to correlate on.
    pub fn for_event(event: &DeathEvent) -> Option<Self> {
        let killer = event.killer_identity()?;
        Some(Self(format!("{}:{}", killer, event.victim_kind)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// FarmingSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FarmingSession {
    pub killer_name:    String,
    pub victim_name:    String,
    pub victim_kind:    String,
    pub start_time:     u64,
    pub last_kill_time: u64,
    pub kill_count:     u32,
    /// Flips to true once, when the farming notification is claimed.
    pub notified:       bool,
}

impl FarmingSession {
    /// A session seeded by its first kill.
    pub fn start(event: &DeathEvent, now: u64) -> Self {
        Self {
            killer_name:    event.killer_name.clone().unwrap_or_default(),
            victim_name:    event.victim_name.clone(),
            victim_kind:    event.victim_kind.clone(),
            start_time:     now,
            last_kill_time: now,
            kill_count:     1,
            notified:       false,
        }
    }

    pub fn record_kill(&mut self, now: u64) {
        self.kill_count = self.kill_count.saturating_add(1);
        // Producers may race with slightly different clock reads.
        self.last_kill_time = self.last_kill_time.max(now);
    }

    /// Claims the farming notification if the threshold is met and nobody
    /// claimed it yet. True only for the single caller that flips the flag.
    pub fn claim_notification(&mut self, notify_after_kills: u32) -> bool {
        if self.notified || self.kill_count < notify_after_kills {
            return false;
        }
        self.notified = true;
        true
    }

    pub fn idle_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_kill_time)
    }

    pub fn is_active(&self, now: u64, idle_timeout_secs: u64) -> bool {
        self.idle_secs(now) <= idle_timeout_secs
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.last_kill_time.saturating_sub(self.start_time)
    }

    /// Kills per minute, floored; elapsed time counts as at least one second.
    pub fn kills_per_minute(&self) -> u64 {
        (self.kill_count as u64 * 60) / self.elapsed_secs().max(1)
    }

    pub fn experience(&self, xp: &XpTable) -> u64 {
        self.kill_count as u64 * xp.value_of(&self.victim_kind) as u64
    }

    pub fn formatted_duration(&self) -> String {
        let elapsed = self.elapsed_secs();
        let (minutes, seconds) = (elapsed / 60, elapsed % 60);
        if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Multi-line closing summary. Timestamps use chat relative-time markers.
    pub fn summary(&self, xp: &XpTable) -> String {
        format!(
            "**{}** farmed **{}**\n\
             • Total Kills: {}\n\
             • Experience dropped: {}\n\
             • Duration: {}\n\
             • Rate: ~{} kills/min\n\
             • Started: <t:{}:R>\n\
             • Ended: <t:{}:R>",
            self.killer_name,
            self.victim_name,
            self.kill_count,
            self.experience(xp),
            self.formatted_duration(),
            self.kills_per_minute(),
            self.start_time,
            self.last_kill_time,
        )
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<SessionKey, FarmingSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up `key`, seeding it with `seed()` if absent, then runs `update`
    /// on the live session. The lookup, the seed and the update form one
    /// atomic unit; `update` receives `true` when this call created the session.
    ///
    /// `update` must not call back into the store.
    pub fn get_or_create<R>(
        &self,
        key:    SessionKey,
        seed:   impl FnOnce() -> FarmingSession,
        update: impl FnOnce(&mut FarmingSession, bool) -> R,
    ) -> R {
        match self.sessions.entry(key) {
            Entry::Occupied(mut slot) => update(slot.get_mut(), false),
            Entry::Vacant(slot) => {
                let mut session = slot.insert(seed());
                update(session.value_mut(), true)
            }
        }
    }

    /// Removes every session matching `predicate`, one entry at a time, and
    /// hands each removed session to `on_removed` with no lock held. Returns
    /// how many sessions were removed.
    ///
    /// Each removal re-checks `predicate` under the entry's lock, so a session
    /// that took a kill since the key snapshot stays. Sessions inserted while
    /// the sweep runs may or may not be visited. If `on_removed` unwinds, the
    /// keys not yet visited stay in the store for the next sweep.
    pub fn remove_if(
        &self,
        mut predicate:  impl FnMut(&SessionKey, &FarmingSession) -> bool,
        mut on_removed: impl FnMut(SessionKey, FarmingSession),
    ) -> usize {
        let keys: Vec<SessionKey> = self.sessions.iter().map(|e| e.key().clone()).collect();

        let mut removed = 0;
        for key in keys {
            if let Some((key, session)) = self.sessions.remove_if(&key, |k, s| predicate(k, s)) {
                removed += 1;
                on_removed(key, session);
            }
        }
        removed
    }

    pub fn remove(&self, key: &SessionKey) -> Option<FarmingSession> {
        self.sessions.remove(key).map(|(_, session)| session)
    }

    /// Snapshot of the live session for `key`.
    pub fn get(&self, key: &SessionKey) -> Option<FarmingSession> {
        self.sessions.get(key).map(|s| s.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn zombie_kill(killer: &str) -> DeathEvent {
        DeathEvent::builder()
            .victim("Zombie", "minecraft:zombie")
            .killer_name(killer)
            .build(0)
    }

    fn bump(store: &SessionStore, event: &DeathEvent, now: u64) -> (bool, u32) {
        let key = SessionKey::for_event(event).unwrap();
        store.get_or_create(
            key,
            || FarmingSession::start(event, now),
            |session, created| {
                if !created {
                    session.record_kill(now);
                }
                (created, session.kill_count)
            },
        )
    }

    #[test]
    fn key_uses_victim_kind() {
        let event = zombie_kill("Alex");
        assert_eq!(SessionKey::for_event(&event).unwrap().as_str(), "Alex:minecraft:zombie");
    }

    #[test]
    fn get_or_create_seeds_then_updates() {
        let store = SessionStore::new();
        let event = zombie_kill("Alex");
        assert_eq!(bump(&store, &event, 100), (true, 1));
        assert_eq!(bump(&store, &event, 105), (false, 2));
        assert_eq!(bump(&store, &event, 103), (false, 3));

        let session = store.get(&SessionKey::for_event(&event).unwrap()).unwrap();
        assert_eq!(session.start_time, 100);
        assert_eq!(session.last_kill_time, 105, "kill time never moves backwards");
    }

    #[test]
    fn notification_claimed_once() {
        let mut session = FarmingSession::start(&zombie_kill("Alex"), 0);
        for _ in 0..8 {
            session.record_kill(1);
        }
        assert!(!session.claim_notification(10), "9 kills is not farming");
        session.record_kill(2);
        assert!(session.claim_notification(10));
        session.record_kill(3);
        assert!(!session.claim_notification(10));
        assert!(session.notified);
    }

    #[test]
    fn remove_if_hands_over_removed_sessions() {
        let store = SessionStore::new();
        bump(&store, &zombie_kill("Alex"), 0);
        bump(&store, &zombie_kill("Steve"), 50);

        let mut closed = Vec::new();
        let removed = store.remove_if(
            |_, s| s.idle_secs(70) > 60,
            |_, s| closed.push(s.killer_name),
        );
        assert_eq!(removed, 1);
        assert_eq!(closed, vec!["Alex".to_owned()]);
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove_if(|_, s| s.idle_secs(70) > 60, |_, _| {}), 0);
    }

    #[test]
    fn callback_can_touch_the_store() {
        // No shard lock is held while the callback runs.
        let store = SessionStore::new();
        for killer in ["A", "B", "C"] {
            bump(&store, &zombie_kill(killer), 0);
        }
        let removed = store.remove_if(|_, _| true, |_, _| assert!(store.len() < 3));
        assert_eq!(removed, 3);
        assert!(store.is_empty());
    }

    #[test]
    fn unwinding_callback_leaves_unvisited_sessions() {
        let store = SessionStore::new();
        for killer in ["A", "B", "C"] {
            bump(&store, &zombie_kill(killer), 0);
        }
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.remove_if(|_, _| true, |_, _| panic!("close failed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(store.len(), 2, "only the entry being closed was removed");
    }

    #[test]
    fn remove_by_key() {
        let store = SessionStore::new();
        let event = zombie_kill("Alex");
        bump(&store, &event, 0);
        let key = SessionKey::for_event(&event).unwrap();
        assert!(store.remove(&key).is_some());
        assert!(store.remove(&key).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_first_kills_create_once() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    let event = zombie_kill("Alex");
                    (0..100).filter(|_| bump(&store, &event, 10).0).count()
                })
            })
            .collect();

        let created: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(created, 1);
        let session = store.get(&SessionKey::for_event(&zombie_kill("Alex")).unwrap()).unwrap();
        assert_eq!(session.kill_count, 800);
    }

    #[test]
    fn summary_math() {
        let mut session = FarmingSession::start(&zombie_kill("Alex"), 1_000);
        for i in 1..11 {
            session.record_kill(1_000 + i * 9); // 11 kills over 90s
        }
        assert_eq!(session.kill_count, 11);
        assert_eq!(session.elapsed_secs(), 90);
        assert_eq!(session.kills_per_minute(), 7); // floor(660 / 90)
        assert_eq!(session.formatted_duration(), "1m 30s");

        let text = session.summary(&XpTable::builtin());
        assert!(text.starts_with("**Alex** farmed **Zombie**"));
        assert!(text.contains("Total Kills: 11"));
        assert!(text.contains("Experience dropped: 55"));
        assert!(text.contains("Rate: ~7 kills/min"));
        assert!(text.contains("Started: <t:1000:R>"));
        assert!(text.contains("Ended: <t:1090:R>"));
    }

    #[test]
    fn rate_floors_elapsed_at_one_second() {
        let mut session = FarmingSession::start(&zombie_kill("Alex"), 500);
        session.record_kill(500);
        assert_eq!(session.elapsed_secs(), 0);
        assert_eq!(session.kills_per_minute(), 120);
        assert_eq!(session.formatted_duration(), "0s");
    }
}
