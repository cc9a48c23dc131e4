//! Peer command: run the TCP link to the other device.
//!
//! While running, lines typed on stdin change settings:
//!
//! ```text
//! tempo fast | tempo 64
//! order Memo Aid, Metronome
//! memo Take the keys
//! show | push | quit
//! ```

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use unfog_core::settings::DisplayOrder;
use unfog_core::storage::JsonFileStore;
use unfog_core::store::{ActivationState, SharedStateStore, StoreActor, StoreHandle, StoreOptions};
use unfog_core::transport::{
    event_channel, DeviceRole, Outbox, TcpEndpoint, TcpTransport, TcpTransportConfig,
};

use super::{load_config, parse_tempo, PeerArgs};
use crate::ui;

/// Run the peer command.
pub async fn run(args: PeerArgs) -> anyhow::Result<()> {
    let config = load_config();
    let role = args.role.map_or(config.general.role, DeviceRole::from);
    let device_name = args
        .name
        .clone()
        .unwrap_or_else(|| config.general.device_name.clone());

    let endpoint = match (args.listen, args.connect, config.sync.peer_addr) {
        (Some(addr), _, _) => TcpEndpoint::Listen(addr.unwrap_or(config.sync.listen_addr)),
        (None, Some(addr), _) | (None, None, Some(addr)) => TcpEndpoint::Connect(addr),
        (None, None, None) => TcpEndpoint::Listen(config.sync.listen_addr),
    };

    let data_dir = config.data_dir();
    let storage = JsonFileStore::open_in(&data_dir)
        .with_context(|| format!("Cannot open settings in {}", data_dir.display()))?;
    let outbox = Arc::new(Outbox::open_in(&data_dir)?);

    let (tx, rx) = event_channel();
    let (transport, link_task) = TcpTransport::start(
        TcpTransportConfig {
            role,
            device_name: device_name.clone(),
            endpoint,
            reconnect_delay: config.sync.reconnect_delay,
        },
        outbox,
        tx,
    )
    .await;

    let store = SharedStateStore::load_with_options(
        Box::new(storage),
        Arc::new(transport.clone()),
        &StoreOptions::from_config(&config),
    );
    let mut events = store.subscribe();
    let initial = store.snapshot();
    let (handle, store_task) = StoreActor::spawn(store, rx);

    if !args.quiet && !args.json {
        ui::banner();
        println!();
        println!("  {} ({})", device_name, role);
        match endpoint {
            TcpEndpoint::Listen(addr) => println!(
                "  Waiting for the {} on {}",
                role.peer(),
                transport.local_addr().unwrap_or(addr)
            ),
            TcpEndpoint::Connect(addr) => println!("  Connecting to the {} at {}", role.peer(), addr),
        }
        println!();
        ui::SettingsBox::new("Current settings", &initial).display();
        println!();
        if !args.no_input {
            println!("  Commands: tempo <bpm|slow|medium|fast>, order <a,b>, memo <text>, show, push, quit");
        }
        println!("  Ctrl+C to stop");
        println!();
    }

    let mut lines = (!args.no_input).then(|| BufReader::new(tokio::io::stdin()).lines());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event, args.quiet, args.json),
                Err(RecvError::Lagged(n)) => tracing::warn!("Missed {} store events", n),
                Err(RecvError::Closed) => break,
            },
            line = next_line(&mut lines) => match line {
                Some(line) => {
                    if !handle_line(&handle, line.trim(), args.json).await? {
                        break;
                    }
                }
                None => lines = None,
            },
        }
    }

    handle.shutdown().await;
    transport.shutdown();
    let store = store_task.await.context("store task failed")?;
    let _ = link_task.await;

    if !args.quiet {
        let stats = store.stats();
        if args.json {
            let output = serde_json::json!({
                "status": "stopped",
                "settings": ui::settings_json(store.settings()),
                "stats": {
                    "local_changes": stats.local_changes,
                    "remote_changes": stats.remote_changes,
                    "immediate_sends": stats.immediate_sends,
                    "durable_sends": stats.durable_sends,
                    "fallbacks": stats.fallbacks,
                    "persistence_failures": stats.persistence_failures,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!();
            println!("  Link stopped.");
            println!(
                "  Changes: {} local, {} from peer ({} sent live, {} queued)",
                stats.local_changes,
                stats.remote_changes,
                stats.immediate_sends,
                stats.durable_sends
            );
            println!();
        }
    }

    Ok(())
}

type StdinLines = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

async fn next_line(lines: &mut Option<StdinLines>) -> Option<String> {
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => std::future::pending().await,
    }
}

/// Apply one stdin command. Returns `false` to stop.
async fn handle_line(handle: &StoreHandle, line: &str, json: bool) -> anyhow::Result<bool> {
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, r)| (c, r.trim()));

    let result = match command {
        "" => return Ok(true),
        "quit" | "exit" => return Ok(false),
        "tempo" => match parse_tempo(rest) {
            Ok(bpm) => handle.set_tempo(bpm).await.map(|_| ()),
            Err(e) => {
                eprintln!("  {e}");
                return Ok(true);
            }
        },
        "order" => handle
            .set_display_order(DisplayOrder::parse(rest))
            .await
            .map(|_| ()),
        "memo" => handle.set_memo_text(rest).await.map(|_| ()),
        "push" => handle.push_full_snapshot().await,
        "show" => {
            let settings = handle.snapshot().await?;
            if json {
                println!("{}", ui::settings_json(&settings));
            } else {
                ui::SettingsBox::new("Current settings", &settings).display();
            }
            return Ok(true);
        }
        other => {
            eprintln!("  Unknown command: {other}");
            return Ok(true);
        }
    };

    match result {
        Ok(()) => Ok(true),
        Err(unfog_core::Error::StoreClosed) => Ok(false),
        Err(e) => {
            eprintln!("  {e}");
            if let Some(hint) = e.suggestion() {
                eprintln!("  Hint: {hint}");
            }
            Ok(true)
        }
    }
}

fn print_event(event: &unfog_core::store::StoreEvent, quiet: bool, json: bool) {
    if quiet {
        return;
    }

    if json {
        println!("{}", event_json(event));
        return;
    }

    println!("  {}", ui::describe_event(event));

    if let unfog_core::store::StoreEvent::Activation(ActivationState::Failed(reason)) = event {
        let error = unfog_core::Error::ActivationFailed(reason.clone());
        if let Some(hint) = error.suggestion() {
            println!("  Hint: {hint}");
        }
    }
}

fn event_json(event: &unfog_core::store::StoreEvent) -> serde_json::Value {
    use unfog_core::store::StoreEvent;

    match event {
        StoreEvent::Changed {
            field,
            origin,
            settings,
        } => serde_json::json!({
            "event": "changed",
            "field": field,
            "origin": origin,
            "settings": ui::settings_json(settings),
        }),
        StoreEvent::PersistenceFailed { field, message, at } => serde_json::json!({
            "event": "persistence_failed",
            "field": field,
            "message": message,
            "at": at,
        }),
        StoreEvent::Propagated { fields, route } => serde_json::json!({
            "event": "propagated",
            "fields": fields,
            "route": route,
        }),
        StoreEvent::PropagationSkipped { fields, reason } => serde_json::json!({
            "event": "propagation_skipped",
            "fields": fields,
            "reason": reason,
        }),
        StoreEvent::Activation(state) => serde_json::json!({
            "event": "activation",
            "state": format!("{state:?}"),
        }),
        StoreEvent::Reachability(reachable) => serde_json::json!({
            "event": "reachability",
            "reachable": reachable,
        }),
    }
}
