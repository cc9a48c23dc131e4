//! CLI command definitions and handlers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use unfog_core::config::Config;
use unfog_core::settings::TempoPreset;
use unfog_core::storage::JsonFileStore;
use unfog_core::store::{SharedStateStore, StoreOptions};
use unfog_core::transport::{event_channel, DeviceRole, OfflineTransport, Outbox};

pub mod completions;
pub mod config;
pub mod demo;
pub mod memo;
pub mod metronome;
pub mod peer;
pub mod settings;

/// Load configuration with graceful fallback to defaults.
///
/// A broken config file is reported and ignored so that settings can still
/// be read and edited.
pub fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring configuration: {}", e);
        Config::default()
    })
}

/// This device's settings, loaded from disk with an offline transport.
pub struct LocalStore {
    /// The store
    pub store: SharedStateStore,
    /// Snapshot waiting for the peer
    pub outbox: Arc<Outbox>,
    /// Where the files live
    pub data_dir: PathBuf,
}

/// Open the persisted settings without talking to the peer.
///
/// Changes made through the returned store are queued in the persisted
/// outbox and delivered by the next `unfog peer` session.
pub fn open_local_store(config: &Config) -> anyhow::Result<LocalStore> {
    let data_dir = config.data_dir();
    let storage = JsonFileStore::open_in(&data_dir)
        .with_context(|| format!("Cannot open settings in {}", data_dir.display()))?;
    let outbox = Arc::new(Outbox::open_in(&data_dir)?);

    let (tx, mut rx) = event_channel();
    let transport = OfflineTransport::start(Arc::clone(&outbox), &tx);
    let mut store = SharedStateStore::load_with_options(
        Box::new(storage),
        Arc::new(transport),
        &StoreOptions::from_config(config),
    );
    while let Ok(event) = rx.try_recv() {
        store.handle_transport_event(event);
    }

    Ok(LocalStore {
        store,
        outbox,
        data_dir,
    })
}

/// Parse a tempo given as BPM or as a preset name (`slow`, `medium`, `fast`).
pub fn parse_tempo(value: &str) -> Result<u32, String> {
    if let Some(preset) = TempoPreset::from_name(value) {
        return Ok(preset as u32);
    }
    value.trim().parse::<u32>().map_err(|_| {
        format!("'{value}' is not a number of beats per minute or one of slow, medium, fast")
    })
}

/// UNFOG - phone/watch settings sync for the metronome and memo aid
#[derive(Parser)]
#[command(name = "unfog")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Show the current settings
    Show(ShowArgs),

    /// Change one setting (queued for the peer)
    Set(SetArgs),

    /// Queue all settings for the peer
    Push(PushArgs),

    /// Run the link to the other device
    Peer(PeerArgs),

    /// Run the metronome at the stored tempo
    Metronome(MetronomeArgs),

    /// Speak the stored memo text
    Memo(MemoArgs),

    /// Simulate a phone and a watch in one process
    Demo(DemoArgs),

    /// Manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the show command
#[derive(Parser)]
pub struct ShowArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the set command
#[derive(Parser)]
pub struct SetArgs {
    /// Setting to change
    #[command(subcommand)]
    pub field: SetField,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,
}

/// Settings that can be changed
#[derive(Subcommand)]
pub enum SetField {
    /// Metronome tempo in BPM, or slow (30), medium (50), fast (79)
    Tempo {
        /// Beats per minute or preset name
        #[arg(value_parser = parse_tempo)]
        bpm: u32,
    },

    /// Order of the tools on the home screen
    Order {
        /// Tool names, e.g. "Memo Aid" Metronome, or one comma-separated list
        #[arg(required = true)]
        tools: Vec<String>,
    },

    /// Text spoken by the memo aid (use "" to clear)
    Memo {
        /// Memo text
        text: String,
    },
}

/// Arguments for the push command
#[derive(Parser)]
pub struct PushArgs {
    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the peer command
#[derive(Parser)]
pub struct PeerArgs {
    /// Which device this process is (defaults to config)
    #[arg(long, value_enum)]
    pub role: Option<RoleArg>,

    /// Wait for the other device on this address
    #[arg(long, value_name = "ADDR", num_args = 0..=1, conflicts_with = "connect")]
    pub listen: Option<Option<SocketAddr>>,

    /// Connect to the other device at this address
    #[arg(long, value_name = "ADDR")]
    pub connect: Option<SocketAddr>,

    /// Name announced to the peer
    #[arg(long)]
    pub name: Option<String>,

    /// Don't read commands from stdin
    #[arg(long)]
    pub no_input: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

/// Device role on the command line
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum RoleArg {
    /// The phone
    Phone,
    /// The watch
    Watch,
}

impl From<RoleArg> for DeviceRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Phone => Self::Phone,
            RoleArg::Watch => Self::Watch,
        }
    }
}

/// Arguments for the metronome command
#[derive(Parser)]
pub struct MetronomeArgs {
    /// Override the stored tempo (BPM or preset name)
    #[arg(short, long, value_parser = parse_tempo)]
    pub tempo: Option<u32>,

    /// Stop after this many beats (runs until Ctrl+C otherwise)
    #[arg(short, long)]
    pub beats: Option<u64>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the memo command
#[derive(Parser)]
pub struct MemoArgs {
    /// Speak this text instead of the stored memo
    #[arg(short, long)]
    pub text: Option<String>,

    /// Speech language (defaults to config)
    #[arg(short, long)]
    pub language: Option<String>,
}

/// Arguments for the demo command
#[derive(Parser)]
pub struct DemoArgs {
    /// Print the final state as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config subcommand
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show all configuration
    Show {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Arguments for the completions command
#[derive(Parser)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: ShellType,
}

/// Supported shell types for completions
#[derive(Clone, Copy, ValueEnum, Debug)]
pub enum ShellType {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    #[value(name = "powershell")]
    PowerShell,
    /// Elvish shell
    Elvish,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use unfog_core::settings::SyncedSettings;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tempo() {
        assert_eq!(parse_tempo("fast"), Ok(79));
        assert_eq!(parse_tempo("Slow"), Ok(30));
        assert_eq!(parse_tempo(" 120 "), Ok(120));
        assert!(parse_tempo("brisk").is_err());
    }

    #[test]
    fn test_set_order_collects_tools() {
        let cli = Cli::try_parse_from(["unfog", "set", "order", "Memo Aid", "Metronome"]).unwrap();
        match cli.command {
            Command::Set(SetArgs {
                field: SetField::Order { tools },
                ..
            }) => assert_eq!(tools, vec!["Memo Aid", "Metronome"]),
            _ => panic!("expected set order"),
        }
    }

    #[test]
    fn test_peer_listen_without_address() {
        let cli = Cli::try_parse_from(["unfog", "peer", "--listen"]).unwrap();
        match cli.command {
            Command::Peer(args) => {
                assert_eq!(args.listen, Some(None));
                assert!(args.connect.is_none());
            }
            _ => panic!("expected peer"),
        }
    }

    #[test]
    fn test_open_local_store_uses_data_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());

        let mut local = open_local_store(&config).unwrap();
        assert!(local.store.set_tempo(79).unwrap());
        assert!(!local.outbox.is_empty());
        drop(local);

        let reopened = open_local_store(&config).unwrap();
        assert_eq!(reopened.store.snapshot().tempo.bpm(), 79);
        assert!(!reopened.outbox.is_empty());
        assert_eq!(reopened.data_dir, dir.path());
    }

    #[test]
    fn test_open_local_store_survives_corrupt_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{ not json").unwrap();
        let mut config = Config::default();
        config.storage.data_dir = Some(dir.path().to_path_buf());

        let mut local = open_local_store(&config).unwrap();
        assert_eq!(local.store.snapshot(), SyncedSettings::default());
        assert!(dir.path().join("settings.json.corrupt").exists());

        assert!(local.store.set_memo_text("Keys"));
        assert_eq!(local.store.stats().persistence_failures, 0);
    }
}
