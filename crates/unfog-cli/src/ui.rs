//! UI utilities for the UNFOG CLI.

use unfog_core::settings::{SyncedSettings, TempoPreset};
use unfog_core::store::{PropagationRoute, StoreEvent};

const BOX_WIDTH: usize = 41;

/// Print the program banner.
pub fn banner() {
    println!("\nUNFOG v{}", env!("CARGO_PKG_VERSION"));
    println!("─────────────────────────────────────");
}

/// A boxed summary of the synchronized settings.
pub struct SettingsBox<'a> {
    settings: &'a SyncedSettings,
    title: &'a str,
}

impl<'a> SettingsBox<'a> {
    /// Create a box titled `title`.
    #[must_use]
    pub const fn new(title: &'a str, settings: &'a SyncedSettings) -> Self {
        Self { settings, title }
    }

    /// Display the box to stdout.
    pub fn display(&self) {
        let tempo = match TempoPreset::from_tempo(self.settings.tempo) {
            Some(preset) => format!("{} ({})", self.settings.tempo, preset.label()),
            None => self.settings.tempo.to_string(),
        };
        let memo = if self.settings.memo_text.is_empty() {
            "(empty)".to_string()
        } else {
            truncate(&self.settings.memo_text, BOX_WIDTH - 10)
        };

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(self.title, BOX_WIDTH));
        println!("  ├{}┤", "─".repeat(BOX_WIDTH));
        println!("  │{}│", row("Tempo", &tempo));
        for (i, slot) in self.settings.display_order.slots().iter().enumerate() {
            let label = if i == 0 { "Order" } else { "" };
            println!("  │{}│", row(label, &format!("{}. {}", i + 1, slot)));
        }
        println!("  │{}│", row("Memo", &memo));
        println!("  └{}┘", "─".repeat(BOX_WIDTH));
    }
}

fn row(label: &str, value: &str) -> String {
    let line = format!(" {label:<6} {value}");
    let len = line.chars().count();
    format!("{}{}", line, " ".repeat(BOX_WIDTH.saturating_sub(len)))
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Shorten `text` to at most `max` characters, marking the cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{kept}…")
}

/// JSON view of the settings, keyed like the wire payload.
pub fn settings_json(settings: &SyncedSettings) -> serde_json::Value {
    serde_json::json!({
        "tempoBpm": settings.tempo.bpm(),
        "displayOrder": settings.display_order.to_wire(),
        "memoText": settings.memo_text,
    })
}

/// One-line description of a store event.
pub fn describe_event(event: &StoreEvent) -> String {
    match event {
        StoreEvent::Changed {
            field,
            origin,
            settings,
        } => {
            let arrow = match origin {
                unfog_core::store::ChangeOrigin::Local => "→",
                unfog_core::store::ChangeOrigin::Remote => "←",
            };
            let value = match field {
                unfog_core::settings::SettingsField::Tempo => settings.tempo.to_string(),
                unfog_core::settings::SettingsField::DisplayOrder => {
                    settings.display_order.to_wire()
                }
                unfog_core::settings::SettingsField::MemoText => {
                    format!("\"{}\"", truncate(&settings.memo_text, 40))
                }
            };
            format!("{arrow} {field}: {value}")
        }
        StoreEvent::PersistenceFailed { field, message, .. } => {
            format!("! {field} was not saved and will be lost on restart: {message}")
        }
        StoreEvent::Propagated { fields, route } => {
            let how = match route {
                PropagationRoute::Immediate => "sent",
                PropagationRoute::Durable => "queued",
                PropagationRoute::DurableFallback => "queued after send failed",
            };
            format!("  {how}: {}", join_fields(fields))
        }
        StoreEvent::PropagationSkipped { fields, reason } => {
            format!("  kept local ({reason}): {}", join_fields(fields))
        }
        StoreEvent::Activation(state) => format!("  sync {state:?}").to_lowercase(),
        StoreEvent::Reachability(true) => "✓ peer connected".to_string(),
        StoreEvent::Reachability(false) => "✗ peer disconnected".to_string(),
    }
}

fn join_fields(fields: &[unfog_core::settings::SettingsField]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
