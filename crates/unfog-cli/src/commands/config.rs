//! Config command handler.

use anyhow::Context;
use unfog_core::config::Config;

use super::{load_config, ConfigAction, ConfigArgs};

/// Run the config command.
pub fn run(args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show { json } => {
            let config = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("# {}", Config::config_path().display());
                println!("{}", toml::to_string_pretty(&config)?);
                println!("# data directory: {}", config.data_dir().display());
            }
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
            Ok(())
        }
        ConfigAction::Init { force } => {
            let path = Config::config_path();
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            Config::default()
                .save_to(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("  ✓ Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
