//! Spoken playback of the memo text.

use std::sync::Arc;

/// Text-to-speech backend.
pub trait Speaker: Send + Sync {
    /// Start speaking `text` in `language` (a BCP 47 tag such as `en-US`).
    fn speak(&self, text: &str, language: &str);

    /// Stop speaking immediately.
    fn stop(&self);
}

/// Plays the memo text through a [`Speaker`].
#[derive(Clone)]
pub struct MemoAid {
    speaker: Arc<dyn Speaker>,
    language: String,
}

impl std::fmt::Debug for MemoAid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoAid")
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl MemoAid {
    /// Create a memo aid speaking in `language`.
    pub fn new(speaker: Arc<dyn Speaker>, language: impl Into<String>) -> Self {
        Self {
            speaker,
            language: language.into(),
        }
    }

    /// Speech language.
    #[must_use]
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Speak `text`. Returns `false` without speaking if there is nothing to say.
    pub fn play(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            tracing::debug!("Memo text is empty, nothing to play");
            return false;
        }
        self.speaker.speak(text, &self.language);
        true
    }

    /// Stop playback.
    pub fn stop(&self) {
        self.speaker.stop();
    }
}
