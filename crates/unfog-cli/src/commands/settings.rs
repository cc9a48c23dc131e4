//! One-shot settings commands: show, set and push.

use tokio::sync::broadcast;
use unfog_core::settings::DisplayOrder;
use unfog_core::store::StoreEvent;

use super::{load_config, open_local_store, PushArgs, SetArgs, SetField, ShowArgs};
use crate::ui;

/// Run the show command.
pub async fn show(args: ShowArgs) -> anyhow::Result<()> {
    let config = load_config();
    let local = open_local_store(&config)?;
    let settings = local.store.snapshot();

    if args.json {
        let output = serde_json::json!({
            "settings": ui::settings_json(&settings),
            "pending": local.outbox.pending().map(|p| serde_json::json!({
                "fields": p.payload.fields(),
                "queued_at": p.queued_at,
            })),
            "data_dir": local.data_dir,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    ui::banner();
    println!();
    ui::SettingsBox::new(&config.general.device_name, &settings).display();
    println!();
    match local.outbox.pending() {
        Some(pending) => println!(
            "  Waiting for peer: {} (since {})",
            pending
                .payload
                .fields()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            pending.queued_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
        None => println!("  Nothing waiting for the peer."),
    }
    println!();
    Ok(())
}

/// Run the set command.
pub async fn set(args: SetArgs) -> anyhow::Result<()> {
    let config = load_config();
    let mut local = open_local_store(&config)?;
    let mut events = local.store.subscribe();

    let changed = match args.field {
        SetField::Tempo { bpm } => local.store.set_tempo(bpm)?,
        SetField::Order { tools } => {
            let order = DisplayOrder::parse(&tools.join(","));
            local.store.set_display_order(order)?
        }
        SetField::Memo { text } => local.store.set_memo_text(text),
    };

    let not_queued = skipped_reason(&mut events);
    let saved = local.store.stats().persistence_failures == 0;
    let settings = local.store.snapshot();

    if args.json {
        let output = serde_json::json!({
            "changed": changed,
            "saved": saved,
            "queued": changed && not_queued.is_none(),
            "settings": ui::settings_json(&settings),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet {
        if !changed {
            println!("  Already set, nothing to do.");
        } else if saved && not_queued.is_none() {
            println!("  ✓ Saved. The other device gets it on the next `unfog peer` session.");
        } else if saved {
            println!("  ✓ Saved on this device.");
        }
    }

    if !saved {
        anyhow::bail!("the change could not be saved to {}", local.data_dir.display());
    }
    if let Some(reason) = not_queued {
        anyhow::bail!("the change was not queued for the other device: {reason}");
    }
    Ok(())
}

/// Run the push command.
pub async fn push(args: PushArgs) -> anyhow::Result<()> {
    let config = load_config();
    let mut local = open_local_store(&config)?;
    let mut events = local.store.subscribe();

    local.store.push_full_snapshot();

    if let Some(reason) = skipped_reason(&mut events) {
        anyhow::bail!("settings were not queued for the other device: {reason}");
    }
    if !args.quiet {
        println!("  ✓ All settings queued for the other device.");
    }
    Ok(())
}

/// Why the last change was not handed to the transport, if it was not.
fn skipped_reason(events: &mut broadcast::Receiver<StoreEvent>) -> Option<String> {
    std::iter::from_fn(|| events.try_recv().ok()).find_map(|event| match event {
        StoreEvent::PropagationSkipped { reason, .. } => Some(reason),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use unfog_core::settings::SyncPayload;
    use unfog_core::storage::MemoryStore;
    use unfog_core::store::SharedStateStore;
    use unfog_core::transport::{TransportChannel, TransportEvent};

    struct FullDisk;

    impl TransportChannel for FullDisk {
        fn is_reachable(&self) -> bool {
            false
        }

        fn send_immediate(&self, _payload: &SyncPayload) -> unfog_core::Result<()> {
            Err(unfog_core::Error::PeerUnreachable)
        }

        fn send_durable(&self, _payload: &SyncPayload) -> unfog_core::Result<()> {
            Err(unfog_core::Error::Persistence("no space left".into()))
        }
    }

    #[test]
    fn test_failed_queue_is_reported() {
        let mut store = SharedStateStore::load(Box::new(MemoryStore::new()), Arc::new(FullDisk));
        store.handle_transport_event(TransportEvent::activated());
        let mut events = store.subscribe();

        store.push_full_snapshot();

        let reason = skipped_reason(&mut events).expect("push was skipped");
        assert!(reason.contains("no space left"));
        assert_eq!(store.stats().skipped, 1);
    }

    #[test]
    fn test_queued_change_has_no_skip_reason() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = unfog_core::config::Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());
        let mut local = open_local_store(&config).unwrap();
        let mut events = local.store.subscribe();

        assert!(local.store.set_tempo(30).unwrap());

        assert_eq!(skipped_reason(&mut events), None);
        assert!(!local.outbox.is_empty());
    }
}
