//! Metronome command: beat in the terminal at the stored tempo.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::mpsc;
use unfog_core::metronome::{Metronome, Pulse};
use unfog_core::settings::{Tempo, TempoPreset};

use super::{load_config, open_local_store, MetronomeArgs};

/// Writes one mark per beat and reports it on a channel.
struct ConsolePulse {
    quiet: bool,
    beats: mpsc::UnboundedSender<()>,
}

impl Pulse for ConsolePulse {
    fn pulse(&self) {
        if !self.quiet {
            let mut stdout = std::io::stdout().lock();
            let _ = write!(stdout, "●");
            let _ = stdout.flush();
        }
        let _ = self.beats.send(());
    }
}

/// Run the metronome command.
pub async fn run(args: MetronomeArgs) -> anyhow::Result<()> {
    let tempo = match args.tempo {
        Some(bpm) => Tempo::new(bpm)?,
        None => {
            let config = load_config();
            open_local_store(&config)?.store.snapshot().tempo
        }
    };

    if !args.quiet {
        let preset = TempoPreset::from_tempo(tempo)
            .map(|p| format!(" ({})", p.label()))
            .unwrap_or_default();
        println!(
            "  Metronome at {}{}, one beat every {:.2}s. Ctrl+C to stop.",
            tempo,
            preset,
            tempo.beat_interval().as_secs_f64()
        );
    }

    let (tx, mut beats) = mpsc::unbounded_channel();
    let mut metronome = Metronome::new(Arc::new(ConsolePulse {
        quiet: args.quiet,
        beats: tx,
    }));
    metronome.start(tempo);

    let mut count = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            beat = beats.recv() => {
                if beat.is_none() {
                    break;
                }
                count += 1;
                if args.beats.is_some_and(|limit| count >= limit) {
                    break;
                }
            }
        }
    }

    metronome.stop();
    if !args.quiet {
        println!();
        println!("  {count} beats");
    }
    Ok(())
}
