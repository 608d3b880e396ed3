/// Immutable record of one entity death.
///
/// Built once per kill by the feed parser (or directly by an embedding host)
/// and never mutated afterwards. The engine stores it in the history log
/// behind an `Arc`, so queries hand out shared references rather than copies.
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Fallback when the source could not render a death message.
pub const DEFAULT_DEATH_MESSAGE: &str = "died";
const UNKNOWN_DIMENSION: &str = "Unknown Dimension";

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x:         f64,
    pub y:         f64,
    pub z:         f64,
    /// Display name, already normalised (e.g. "Nether", not "minecraft:the_nether").
    pub dimension: String,
}

impl Location {
    pub fn new(x: f64, y: f64, z: f64, dimension: Option<&str>) -> Self {
        Self { x, y, z, dimension: display_dimension(dimension) }
    }
}

impl Default for Location {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, None)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Halves round away from zero (2.5 -> 3), not to even.
        write!(
            f,
            " at [{:.0}, {:.0}, {:.0}] in {}",
            self.x.round(),
            self.y.round(),
            self.z.round(),
            self.dimension
        )
    }
}

/// Vanilla dimension ids get friendly names; anything else passes through.
fn display_dimension(raw: Option<&str>) -> String {
    match raw {
        Some("minecraft:overworld")  => "Overworld".to_owned(),
        Some("minecraft:the_nether") => "Nether".to_owned(),
        Some("minecraft:the_end")    => "End".to_owned(),
        Some(other) if !other.is_empty() => other.to_owned(),
        _ => UNKNOWN_DIMENSION.to_owned(),
    }
}

// ---------------------------------------------------------------------------
// DeathEvent
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathEvent {
    /// Absent for sources that are not real entities.
    pub victim_id:     Option<Uuid>,
    pub victim_name:   String,
    /// Categorical tag, e.g. "minecraft:zombie". Keys farming sessions and XP lookup.
    pub victim_kind:   String,
    /// Seconds since the Unix epoch.
    pub timestamp:     u64,
    pub killer_name:   Option<String>,
    pub killer_id:     Option<Uuid>,
    pub killer_kind:   Option<String>,
    pub location:      Location,
    pub death_message: String,
    pub damage_source: String,
}

impl DeathEvent {
    pub fn builder() -> DeathEventBuilder {
        DeathEventBuilder::default()
    }

    /// Killer id when known, otherwise the killer name. `None` when nobody
    /// (or nothing named) caused the death.
    pub fn killer_identity(&self) -> Option<String> {
        let name = self.killer_name.as_ref()?;
        Some(
            self.killer_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| name.clone()),
        )
    }

    /// Death message with the location suffix, as posted to chat.
    pub fn describe(&self) -> String {
        format!("{}{}", self.death_message, self.location)
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DeathEventBuilder {
    victim_id:     Option<Uuid>,
    victim_name:   String,
    victim_kind:   String,
    killer_name:   Option<String>,
    killer_id:     Option<Uuid>,
    killer_kind:   Option<String>,
    location:      Option<Location>,
    death_message: Option<String>,
    damage_source: String,
}

impl DeathEventBuilder {
    pub fn victim_id(mut self, id: Uuid) -> Self {
        self.victim_id = Some(id);
        self
    }

    pub fn victim(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.victim_name = name.into();
        self.victim_kind = kind.into();
        self
    }

    pub fn killer_name(mut self, name: impl Into<String>) -> Self {
        self.killer_name = Some(name.into());
        self
    }

    pub fn killer_id(mut self, id: Uuid) -> Self {
        self.killer_id = Some(id);
        self
    }

    pub fn killer_kind(mut self, kind: impl Into<String>) -> Self {
        self.killer_kind = Some(kind.into());
        self
    }

    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn death_message(mut self, message: impl Into<String>) -> Self {
        self.death_message = Some(message.into());
        self
    }

    pub fn damage_source(mut self, source: impl Into<String>) -> Self {
        self.damage_source = source.into();
        self
    }

    pub fn build(self, timestamp: u64) -> DeathEvent {
        DeathEvent {
            victim_id:     self.victim_id,
            victim_name:   self.victim_name,
            victim_kind:   self.victim_kind,
            timestamp,
            killer_name:   self.killer_name,
            killer_id:     self.killer_id,
            killer_kind:   self.killer_kind,
            location:      self.location.unwrap_or_default(),
            death_message: self
                .death_message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_DEATH_MESSAGE.to_owned()),
            damage_source: self.damage_source,
        }
    }
}
