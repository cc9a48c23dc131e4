//! The synchronized settings model.
//!
//! Both devices hold one [`SyncedSettings`] value: the metronome tempo, the
//! order in which the assistive tools are shown, and the memo text read out
//! by the memo aid. Changes travel between devices as a [`SyncPayload`] that
//! carries any subset of the three fields.
//!
//! The display order is a proper sequence of [`ToolSlot`]s in memory; the
//! comma-joined form only exists at the storage and wire edges.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// A validated metronome tempo in beats per minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tempo(u32);

impl Tempo {
    /// Create a tempo, rejecting values outside the accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTempo`] for zero or implausibly high values.
    pub fn new(bpm: u32) -> Result<Self> {
        if (crate::MIN_TEMPO_BPM..=crate::MAX_TEMPO_BPM).contains(&bpm) {
            Ok(Self(bpm))
        } else {
            Err(Error::InvalidTempo(bpm))
        }
    }

    /// Beats per minute.
    #[must_use]
    pub const fn bpm(self) -> u32 {
        self.0
    }

    /// Time between two beats (`60 / bpm` seconds).
    #[must_use]
    pub fn beat_interval(self) -> Duration {
        Duration::from_secs_f64(60.0 / f64::from(self.0))
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self(crate::DEFAULT_TEMPO_BPM)
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.0)
    }
}

impl From<TempoPreset> for Tempo {
    fn from(preset: TempoPreset) -> Self {
        Self(preset as u32)
    }
}

/// Tempo presets offered by the metronome settings screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TempoPreset {
    /// Slow cueing
    Slow = 30,
    /// Medium cueing
    Medium = 50,
    /// Fast cueing
    Fast = 79,
}

impl TempoPreset {
    /// All presets from slowest to fastest.
    pub const ALL: [Self; 3] = [Self::Slow, Self::Medium, Self::Fast];

    /// Preset matching an exact tempo, if any.
    #[must_use]
    pub fn from_tempo(tempo: Tempo) -> Option<Self> {
        Self::ALL.into_iter().find(|p| *p as u32 == tempo.bpm())
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Slow => "Slow",
            Self::Medium => "Medium",
            Self::Fast => "Fast",
        }
    }

    /// Preset by label, ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.label().eq_ignore_ascii_case(name.trim()))
    }
}

/// One assistive tool occupying a slot on the home screen.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolSlot {
    /// The rhythmic metronome
    Metronome,
    /// The spoken memo aid
    MemoAid,
    /// A token this build does not know; kept verbatim
    Other(String),
}

impl ToolSlot {
    /// Parse a single (already trimmed) token.
    #[must_use]
    pub fn from_token(token: &str) -> Self {
        match token {
            "Metronome" => Self::Metronome,
            "Memo Aid" => Self::MemoAid,
            other => Self::Other(other.to_string()),
        }
    }

    /// The token used in storage and on the wire.
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::Metronome => "Metronome",
            Self::MemoAid => "Memo Aid",
            Self::Other(token) => token,
        }
    }
}

impl fmt::Display for ToolSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Ordered list of tools as shown on the home screen.
///
/// Duplicates are allowed; the model does not police them. Every slot holds
/// a trimmed, non-blank token without commas, so an order always equals what
/// the peer parses back from [`to_wire`](Self::to_wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DisplayOrder(Vec<ToolSlot>);

fn tokens(joined: &str) -> impl Iterator<Item = &str> {
    joined.split(',').map(str::trim).filter(|t| !t.is_empty())
}

impl DisplayOrder {
    /// Build an order from slots.
    ///
    /// Tokens are normalized like the comma-joined form: a token containing
    /// commas becomes several slots, blank tokens are dropped and the rest
    /// are trimmed (`Other(" Metronome ")` becomes [`ToolSlot::Metronome`]).
    #[must_use]
    pub fn new(slots: Vec<ToolSlot>) -> Self {
        Self(
            slots
                .iter()
                .flat_map(|slot| tokens(slot.token()))
                .map(ToolSlot::from_token)
                .collect(),
        )
    }

    /// Parse the comma-joined form.
    ///
    /// Tokens are trimmed and empty tokens are dropped, so `" Memo Aid ,,Metronome"`
    /// parses to two slots.
    #[must_use]
    pub fn parse(joined: &str) -> Self {
        Self(tokens(joined).map(ToolSlot::from_token).collect())
    }

    /// The comma-joined form used in storage and on the wire.
    #[must_use]
    pub fn to_wire(&self) -> String {
        self.0
            .iter()
            .map(ToolSlot::token)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Slots in display order.
    #[must_use]
    pub fn slots(&self) -> &[ToolSlot] {
        &self.0
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the order has no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Move the slot at `from` so it ends up at index `to`.
    ///
    /// Out-of-range indices leave the order untouched and return `false`.
    pub fn move_slot(&mut self, from: usize, to: usize) -> bool {
        if from >= self.0.len() || to >= self.0.len() {
            return false;
        }
        let slot = self.0.remove(from);
        self.0.insert(to, slot);
        true
    }
}

impl Default for DisplayOrder {
    fn default() -> Self {
        Self::parse(crate::DEFAULT_DISPLAY_ORDER)
    }
}

impl fmt::Display for DisplayOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl Serialize for DisplayOrder {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for DisplayOrder {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let joined = String::deserialize(deserializer)?;
        Ok(Self::parse(&joined))
    }
}

/// The three settings kept in step between phone and watch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncedSettings {
    /// Metronome tempo
    pub tempo: Tempo,
    /// Tool display order
    pub display_order: DisplayOrder,
    /// Memo text read out by the memo aid
    pub memo_text: String,
}

impl SyncedSettings {
    /// A payload carrying every field, for pushing a full snapshot.
    #[must_use]
    pub fn to_payload(&self) -> SyncPayload {
        SyncPayload {
            tempo_bpm: Some(i64::from(self.tempo.bpm())),
            display_order: Some(self.display_order.clone()),
            memo_text: Some(self.memo_text.clone()),
        }
    }
}

/// Identifies one synchronized field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsField {
    /// Metronome tempo
    Tempo,
    /// Tool display order
    DisplayOrder,
    /// Memo text
    MemoText,
}

impl SettingsField {
    /// Persistence key for this field.
    #[must_use]
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::Tempo => crate::storage::KEY_TEMPO,
            Self::DisplayOrder => crate::storage::KEY_DISPLAY_ORDER,
            Self::MemoText => crate::storage::KEY_MEMO_TEXT,
        }
    }
}

impl fmt::Display for SettingsField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tempo => write!(f, "tempo"),
            Self::DisplayOrder => write!(f, "display order"),
            Self::MemoText => write!(f, "memo text"),
        }
    }
}

/// A sync message: any subset of the three fields.
///
/// Absent fields must not be touched by the receiver. The tempo travels as a
/// raw signed integer so an out-of-range value is rejected on its own instead
/// of failing the whole payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// New tempo, if changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo_bpm: Option<i64>,
    /// New display order, if changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_order: Option<DisplayOrder>,
    /// New memo text, if changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo_text: Option<String>,
}

impl SyncPayload {
    /// Payload carrying only a tempo.
    #[must_use]
    pub fn tempo(tempo: Tempo) -> Self {
        Self {
            tempo_bpm: Some(i64::from(tempo.bpm())),
            ..Self::default()
        }
    }

    /// Payload carrying only a display order.
    #[must_use]
    pub fn display_order(order: DisplayOrder) -> Self {
        Self {
            display_order: Some(order),
            ..Self::default()
        }
    }

    /// Payload carrying only memo text.
    #[must_use]
    pub fn memo_text(text: impl Into<String>) -> Self {
        Self {
            memo_text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Whether the payload carries no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tempo_bpm.is_none() && self.display_order.is_none() && self.memo_text.is_none()
    }

    /// Fields present in this payload.
    #[must_use]
    pub fn fields(&self) -> Vec<SettingsField> {
        let mut fields = Vec::with_capacity(3);
        if self.tempo_bpm.is_some() {
            fields.push(SettingsField::Tempo);
        }
        if self.display_order.is_some() {
            fields.push(SettingsField::DisplayOrder);
        }
        if self.memo_text.is_some() {
            fields.push(SettingsField::MemoText);
        }
        fields
    }
}
