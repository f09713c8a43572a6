use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::metrics::record_progress_write;
use crate::models::{QuizSession, SavedProgress};

use super::progress_store::ProgressStore;

pub const PROGRESS_KEY_PREFIX: &str = "quiz-progress-";
pub const SESSION_KEY_PREFIX: &str = "quiz-session-";

/// What the user wants to do with an unfinished session found on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeDecision {
    Resume,
    Restart,
    Cancel,
}

/// Asks the user whether to resume a saved session.
#[async_trait]
pub trait ResumePrompt: Send + Sync {
    async fn choose(&self, session_id: &str, saved: &SavedProgress) -> ResumeDecision;
}

/// Always answers the same way. Handy for tests and non-interactive runs.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub ResumeDecision);

#[async_trait]
impl ResumePrompt for FixedDecision {
    async fn choose(&self, _session_id: &str, _saved: &SavedProgress) -> ResumeDecision {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// Nothing usable was stored, or the user chose to restart.
    Fresh,
    Resume(SavedProgress),
    Cancel,
}

pub fn progress_key(session_id: &str) -> String {
    format!("{}{}", PROGRESS_KEY_PREFIX, session_id)
}

pub fn session_key(session_id: &str) -> String {
    format!("{}{}", SESSION_KEY_PREFIX, session_id)
}

/// Snapshot persistence keyed by session id.
#[derive(Clone)]
pub struct ProgressService {
    store: Arc<dyn ProgressStore>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    /// Returns the stored snapshot if it parses and still has questions.
    /// Broken entries are left in place; only an explicit restart removes them.
    pub async fn load_existing(&self, session_id: &str) -> Option<SavedProgress> {
        let key = progress_key(session_id);

        let raw = match self.store.load(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!("Failed to read saved progress {}: {}", key, e);
                return None;
            }
        };

        let saved: SavedProgress = match serde_json::from_str(&raw) {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("Ignoring unparsable saved progress {}: {}", key, e);
                return None;
            }
        };

        if !saved.is_resumable() {
            tracing::warn!(
                "Ignoring saved progress {} without a usable question batch",
                key
            );
            return None;
        }

        Some(saved)
    }

    pub async fn save(&self, session_id: &str, progress: &SavedProgress) -> Result<()> {
        let key = progress_key(session_id);
        let json = serde_json::to_string(progress)?;

        let result = self.store.save(&key, &json).await;
        record_progress_write(result.is_ok());
        result?;

        tracing::debug!(
            "Saved progress {}: index={}, answers={}, phase={}",
            key,
            progress.current_question_index,
            progress.answers.len(),
            progress.phase
        );
        Ok(())
    }

    /// Removes the snapshot and the session descriptor stored beside it.
    pub async fn clear(&self, session_id: &str) -> Result<()> {
        let key = progress_key(session_id);
        self.store.delete(&key).await?;
        self.store.delete(&session_key(session_id)).await?;
        tracing::info!("Cleared saved progress {}", key);
        Ok(())
    }

    pub async fn save_session(&self, session: &QuizSession) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.store
            .save(&session_key(&session.session_id), &json)
            .await
    }

    /// The descriptor a session was started with, if one was stored for it.
    pub async fn load_session(&self, session_id: &str) -> Option<QuizSession> {
        let key = session_key(session_id);
        let raw = match self.store.load(&key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!("Failed to read session descriptor {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<QuizSession>(&raw) {
            Ok(session) if session.session_id == session_id => Some(session),
            Ok(_) => {
                tracing::warn!("Ignoring session descriptor {} for another session", key);
                None
            }
            Err(e) => {
                tracing::warn!("Ignoring unparsable session descriptor {}: {}", key, e);
                None
            }
        }
    }

    /// Looks for an unfinished session and lets the user decide what to do
    /// with it before anything touches the network.
    pub async fn offer_resume(
        &self,
        session_id: &str,
        prompt: &dyn ResumePrompt,
    ) -> Result<ResumeOutcome> {
        let Some(saved) = self.load_existing(session_id).await else {
            return Ok(ResumeOutcome::Fresh);
        };

        match prompt.choose(session_id, &saved).await {
            ResumeDecision::Resume => {
                tracing::info!(
                    "Resuming session {} at question {}",
                    session_id,
                    saved.current_question_index
                );
                Ok(ResumeOutcome::Resume(saved))
            }
            ResumeDecision::Restart => {
                tracing::info!("Discarding saved progress for session {}", session_id);
                self.clear(session_id).await?;
                Ok(ResumeOutcome::Fresh)
            }
            ResumeDecision::Cancel => Ok(ResumeOutcome::Cancel),
        }
    }
}
