//! UNFOG CLI - keep the phone and watch assistive tools in step
//!
//! The phone and the watch each hold the metronome tempo, the tool display
//! order and the memo text. `unfog` edits them, runs the peer link between
//! two devices and drives the metronome and memo aid from the terminal.
//!
//! ## Quick Start
//!
//! ```bash
//! # On the watch
//! unfog peer --role watch --listen 0.0.0.0:52550
//!
//! # On the phone
//! unfog peer --role phone --connect 192.168.1.20:52550
//!
//! # Change a setting from another terminal; it is delivered on next connect
//! unfog set tempo fast
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Command::Show(args) => commands::settings::show(args).await,
        Command::Set(args) => commands::settings::set(args).await,
        Command::Push(args) => commands::settings::push(args).await,
        Command::Peer(args) => commands::peer::run(args).await,
        Command::Metronome(args) => commands::metronome::run(args).await,
        Command::Memo(args) => commands::memo::run(args).await,
        Command::Demo(args) => commands::demo::run(args).await,
        Command::Config(args) => commands::config::run(args),
        Command::Completions(args) => {
            commands::completions::run(args.shell);
            Ok(())
        }
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,unfog=info,unfog_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
