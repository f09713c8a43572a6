use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::models::QuizSession;
use crate::utils::rate_limit::RateLimiter;

use self::progress_service::ProgressService;
use self::progress_store::{FileStore, MemoryStore, ProgressStore};
use self::quiz_api::{HttpQuizApi, QuizApi};
use self::session_controller::SessionController;

pub struct QuizContext {
    pub config: Config,
    pub api: Arc<dyn QuizApi>,
    pub progress: ProgressService,
    pub rate_limiter: Arc<RateLimiter>,
}

impl QuizContext {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let rate_limiter = Arc::new(if config.rate_limit_disabled {
            tracing::info!("Client-side rate limiting disabled");
            RateLimiter::disabled()
        } else {
            RateLimiter::new(config.rate_limit_max_requests, config.rate_limit_window)
        });

        let api: Arc<dyn QuizApi> = Arc::new(HttpQuizApi::new(&config, rate_limiter.clone())?);

        let store: Arc<dyn ProgressStore> = match &config.storage {
            StorageBackend::Memory => {
                tracing::info!("Keeping session progress in memory only");
                Arc::new(MemoryStore::new())
            }
            StorageBackend::Directory(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                tracing::info!("Session progress stored under {}", dir.display());
                Arc::new(FileStore::new(dir.clone()))
            }
        };

        tracing::info!(
            "Quiz API at {}/{}",
            config.api_base_url.trim_end_matches('/'),
            config.quiz_path
        );

        Ok(Self::with_parts(config, api, store, rate_limiter))
    }

    /// Wires a context from ready-made parts, e.g. a stub API and an in-memory store.
    pub fn with_parts(
        config: Config,
        api: Arc<dyn QuizApi>,
        store: Arc<dyn ProgressStore>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            config,
            api,
            progress: ProgressService::new(store),
            rate_limiter,
        }
    }

    pub fn controller(&self, session: QuizSession) -> SessionController {
        SessionController::new(
            session,
            self.api.clone(),
            self.progress.clone(),
            self.config.default_difficulty,
        )
    }
}

pub mod progress_service;
pub mod progress_store;
pub mod quiz_api;
pub mod score_engine;
pub mod session_controller;
