//! Memo command: read the memo text aloud.
//!
//! There is no speech engine in a terminal, so the console speaker prints
//! the utterance instead.

use std::sync::Arc;

use unfog_core::memo::{MemoAid, Speaker};

use super::{load_config, open_local_store, MemoArgs};

struct ConsoleSpeaker;

impl Speaker for ConsoleSpeaker {
    fn speak(&self, text: &str, language: &str) {
        println!("  🔊 [{language}] {text}");
    }

    fn stop(&self) {}
}

/// Run the memo command.
pub async fn run(args: MemoArgs) -> anyhow::Result<()> {
    let config = load_config();
    let text = match args.text {
        Some(text) => text,
        None => open_local_store(&config)?.store.snapshot().memo_text,
    };
    let language = args.language.unwrap_or(config.memo.language);

    let memo = MemoAid::new(Arc::new(ConsoleSpeaker), language);
    if !memo.play(&text) {
        println!("  No memo saved. Set one with: unfog set memo \"...\"");
    }
    Ok(())
}
