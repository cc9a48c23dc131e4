//! Demo command: a phone and a watch over an in-process link.
//!
//! Walks through the offline-then-reconnect scenario and a live edit, then
//! prints both devices' settings.

use std::time::Duration;

use unfog_core::settings::{DisplayOrder, SyncedSettings};
use unfog_core::storage::MemoryStore;
use unfog_core::store::{SharedStateStore, StoreActor, StoreHandle};
use unfog_core::transport::{DeviceRole, LoopbackEndpoint, LoopbackLink};

use super::DemoArgs;
use crate::ui;

const SETTLE: Duration = Duration::from_millis(50);

fn spawn(endpoint: LoopbackEndpoint) -> StoreHandle {
    let (channel, events) = endpoint.into_parts();
    let store = SharedStateStore::load(Box::new(MemoryStore::new()), channel);
    StoreActor::spawn(store, events).0
}

/// Wait for in-flight events to be applied on both sides.
async fn settle() {
    tokio::time::sleep(SETTLE).await;
}

fn step(json: bool, text: &str) {
    if !json {
        println!("  {text}");
    }
}

/// Run the demo command.
pub async fn run(args: DemoArgs) -> anyhow::Result<()> {
    let json = args.json;
    let (link, phone, watch) = LoopbackLink::pair();
    let phone = spawn(phone);
    let watch = spawn(watch);

    if !json {
        ui::banner();
        println!();
    }

    link.activate();
    settle().await;
    step(json, "1. Both devices activated, watch out of range");

    phone.set_tempo(79).await?;
    step(json, "2. Phone sets tempo to 79 BPM (queued)");

    watch.set_memo_text("Lock the front door").await?;
    step(json, "3. Watch sets the memo (queued)");

    if let Some(pending) = link.pending_from(DeviceRole::Phone) {
        step(json, &format!("   phone pending: {:?}", pending.fields()));
    }

    link.set_reachable(true);
    settle().await;
    step(json, "4. Watch back in range, pending snapshots delivered");

    phone
        .set_display_order(DisplayOrder::parse("Memo Aid,Metronome"))
        .await?;
    settle().await;
    step(json, "5. Phone reorders the tools (sent live)");

    let phone_settings = phone.snapshot().await?;
    let watch_settings = watch.snapshot().await?;
    let converged = phone_settings == watch_settings;

    if json {
        let output = serde_json::json!({
            "converged": converged,
            "phone": ui::settings_json(&phone_settings),
            "watch": ui::settings_json(&watch_settings),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!();
        ui::SettingsBox::new("Phone", &phone_settings).display();
        ui::SettingsBox::new("Watch", &watch_settings).display();
        println!();
        print_verdict(converged, &phone_settings);
    }

    phone.shutdown().await;
    watch.shutdown().await;
    Ok(())
}

fn print_verdict(converged: bool, settings: &SyncedSettings) {
    if converged {
        println!(
            "  ✓ Devices agree: {}, {} tools, memo of {} characters",
            settings.tempo,
            settings.display_order.len(),
            settings.memo_text.chars().count()
        );
    } else {
        println!("  ✗ Devices disagree");
    }
    println!();
}
