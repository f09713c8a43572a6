//! Drives one quiz attempt from first batch to graded result.
//!
//! The controller's mutable state *is* a [`SavedProgress`]; every mutation is
//! followed by an awaited snapshot write, so the stored copy always matches
//! the latest in-memory state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{QuizError, Result};
use crate::metrics::{record_session_event, ANSWERS_RECORDED_TOTAL};
use crate::models::api::{NextBatchRequest, ReviewResponse, SubmitRequest, SubmitResponse};
use crate::models::{AnswerRecord, Difficulty, Phase, Question, QuizSession, SavedProgress};

use super::progress_service::{ProgressService, ResumeOutcome, ResumePrompt};
use super::quiz_api::QuizApi;
use super::score_engine::ScoreState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Idle,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Fresh,
    Resumed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    Next { index: usize },
    Completed(SubmitResponse),
}

/// Shared pause flag. Clone it into a signal handler to pause from outside.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn pause(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn resume(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SessionController {
    session: QuizSession,
    api: Arc<dyn QuizApi>,
    progress_service: ProgressService,
    default_difficulty: Difficulty,
    state: SavedProgress,
    load_state: LoadState,
    last_result: Option<SubmitResponse>,
    score: ScoreState,
    pause: PauseHandle,
}

impl SessionController {
    pub fn new(
        session: QuizSession,
        api: Arc<dyn QuizApi>,
        progress_service: ProgressService,
        default_difficulty: Difficulty,
    ) -> Self {
        let state = SavedProgress::new(
            Phase::initial(session.is_first_attempt),
            default_difficulty,
        );
        Self {
            session,
            api,
            progress_service,
            default_difficulty,
            state,
            load_state: LoadState::Idle,
            last_result: None,
            score: ScoreState::default(),
            pause: PauseHandle::default(),
        }
    }

    pub fn session(&self) -> &QuizSession {
        &self.session
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    /// Current state, exactly as it is persisted.
    pub fn snapshot(&self) -> &SavedProgress {
        &self.state
    }

    pub fn load_state(&self) -> LoadState {
        self.load_state
    }

    pub fn score(&self) -> &ScoreState {
        &self.score
    }

    pub fn last_result(&self) -> Option<&SubmitResponse> {
        self.last_result.as_ref()
    }

    pub fn current_question(&self) -> Option<&Question> {
        if self.load_state != LoadState::Loaded || !self.state.phase.is_active() {
            return None;
        }
        self.state.current_question()
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// All answers are in but grading has not succeeded yet.
    pub fn awaiting_submission(&self) -> bool {
        self.state.phase == Phase::Completed && self.last_result.is_none()
    }

    /// Resumes a stored attempt if the user wants to, otherwise fetches the
    /// first batch for this session.
    pub async fn initialize(&mut self, prompt: &dyn ResumePrompt) -> Result<InitOutcome> {
        self.validate_session()?;

        match self
            .progress_service
            .offer_resume(&self.session.session_id, prompt)
            .await?
        {
            ResumeOutcome::Cancel => {
                tracing::info!(
                    "Initialization cancelled for session {}",
                    self.session.session_id
                );
                record_session_event("cancelled");
                Ok(InitOutcome::Cancelled)
            }
            ResumeOutcome::Resume(saved) => {
                self.pause.resume();
                self.state = saved;
                self.load_state = LoadState::Loaded;
                self.last_result = None;
                record_session_event("resumed");
                Ok(InitOutcome::Resumed)
            }
            ResumeOutcome::Fresh => {
                self.pause.resume();
                self.score = ScoreState::default();
                self.load_fresh().await?;
                record_session_event("fresh");
                Ok(InitOutcome::Fresh)
            }
        }
    }

    /// Explicit "start over": drops the snapshot and the score, then loads a
    /// new batch without asking about resuming.
    pub async fn restart(&mut self) -> Result<()> {
        self.validate_session()?;
        self.progress_service
            .clear(&self.session.session_id)
            .await?;

        self.pause.resume();
        self.score = ScoreState::default();
        self.last_result = None;
        self.load_fresh().await?;
        record_session_event("restarted");
        Ok(())
    }

    pub async fn select_answer(&mut self, choice: &str) -> Result<()> {
        self.ensure_not_paused()?;
        let question = self.active_question()?;

        if !question.choices.iter().any(|c| c == choice) {
            return Err(QuizError::Validation(format!(
                "'{}' is not a choice for question {}",
                choice, question.question_id
            )));
        }

        self.state.selected_answer = Some(choice.to_string());
        self.persist().await;
        Ok(())
    }

    /// Locks in the selected answer and moves on; the last answer of the batch
    /// completes the phase and submits everything for grading.
    pub async fn confirm_and_advance(&mut self) -> Result<Advance> {
        self.ensure_not_paused()?;
        let question_id = self.active_question()?.question_id.clone();

        let Some(selected_answer) = self.state.selected_answer.take() else {
            return Err(QuizError::AnswerRequired);
        };

        self.state.answers.push(AnswerRecord {
            question_id,
            selected_answer,
        });
        ANSWERS_RECORDED_TOTAL.inc();

        if !self.state.is_last_question() {
            self.state.current_question_index += 1;
            self.persist().await;
            return Ok(Advance::Next {
                index: self.state.current_question_index,
            });
        }

        self.transition_to(Phase::Completed)?;
        self.persist().await;

        let result = self.submit().await?;
        Ok(Advance::Completed(result))
    }

    /// Sends every recorded answer for grading. Safe to call again after a
    /// failure; the snapshot is only removed once grading succeeds.
    pub async fn submit(&mut self) -> Result<SubmitResponse> {
        if self.state.phase != Phase::Completed {
            return Err(QuizError::Validation(
                "Answer every question before submitting".to_string(),
            ));
        }
        if let Some(result) = &self.last_result {
            return Ok(result.clone());
        }
        self.ensure_not_paused()?;

        let session_id = self.session.session_id.clone();
        let request = SubmitRequest {
            responses: self.state.answers.clone(),
        };

        tracing::info!(
            "Submitting {} answers for session {} ({})",
            request.responses.len(),
            session_id,
            self.state.phase
        );

        let api = self.api.clone();
        let result = match api.submit_answers(&session_id, &request).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Submission failed for session {}: {}", session_id, e);
                return Err(e);
            }
        };

        // The grader has the attempt now, even if a pause came in meanwhile
        if let Err(e) = self.progress_service.clear(&session_id).await {
            tracing::warn!(
                "Failed to clear progress for session {}: {}; storing an empty snapshot instead",
                session_id,
                e
            );
            self.forget_graded_batch(&session_id).await;
        }

        let total_questions = self.state.questions.len() as u32;
        self.score = self
            .score
            .replay(self.graded_outcomes(&result), total_questions);
        self.last_result = Some(result.clone());
        record_session_event("completed");

        tracing::info!(
            "Session {} graded: {:.1}%, rank {}, score {}",
            session_id,
            result.score_percent,
            self.score.rank,
            self.score.total_score
        );
        Ok(result)
    }

    /// Fetches the next adaptive batch after a graded phase. Without an
    /// explicit difficulty the grader's suggestion is used.
    pub async fn continue_adaptive(&mut self, difficulty: Option<Difficulty>) -> Result<()> {
        self.ensure_not_paused()?;
        let Some(last) = self.last_result.clone() else {
            return Err(QuizError::Validation(
                "Submit the current batch before continuing".to_string(),
            ));
        };
        if !self.state.phase.can_transition_to(Phase::AdaptiveQuiz) {
            return Err(QuizError::InvalidTransition {
                from: self.state.phase,
                to: Phase::AdaptiveQuiz,
            });
        }

        let difficulty = difficulty
            .or(last.next_difficulty)
            .unwrap_or(self.state.current_difficulty);
        let request = NextBatchRequest {
            difficulty,
            num_questions: self.session.total_questions,
        };

        let api = self.api.clone();
        let response = api
            .next_adaptive_batch(&self.session.session_id, &request)
            .await?;
        if response.current_batch.is_empty() {
            return Err(QuizError::InvalidResponse(
                "adaptive batch contained no questions".to_string(),
            ));
        }

        let mut state = SavedProgress::new(Phase::AdaptiveQuiz, response.difficulty_level);
        state.previous_score_percent = response
            .previous_score_percent
            .or(Some(last.score_percent));
        state.questions = response.current_batch;

        tracing::info!(
            "Session {} continues at {} difficulty with {} questions",
            self.session.session_id,
            state.current_difficulty,
            state.questions.len()
        );

        self.state = state;
        self.last_result = None;
        self.load_state = LoadState::Loaded;
        self.persist().await;
        self.persist_session().await;
        Ok(())
    }

    /// Leaves the session resumable: the snapshot stays, nothing is sent.
    pub fn pause(&mut self) {
        self.pause.pause();
        record_session_event("paused");
        tracing::info!(
            "Session {} paused at question {}",
            self.session.session_id,
            self.state.current_question_index
        );
    }

    /// One second of wall-clock time while a batch is being worked on.
    pub async fn tick(&mut self) {
        if self.load_state != LoadState::Loaded
            || self.pause.is_paused()
            || !self.state.phase.is_active()
        {
            return;
        }
        self.state.elapsed_seconds += 1;
        self.persist().await;
    }

    pub async fn review(&self) -> Result<ReviewResponse> {
        self.api.review(&self.session.session_id).await
    }

    async fn load_fresh(&mut self) -> Result<()> {
        let session_id = self.session.session_id.clone();
        let phase = Phase::initial(self.session.is_first_attempt);
        let api = self.api.clone();

        self.load_state = LoadState::Loading;
        tracing::info!("Loading {} batch for session {}", phase, session_id);

        let fetched = match phase {
            Phase::SkillAssessment => api
                .fetch_initial_batch(&session_id)
                .await
                .map(|response| (response.current_batch, self.default_difficulty, None)),
            _ => {
                let request = NextBatchRequest {
                    difficulty: self.default_difficulty,
                    num_questions: self.session.total_questions,
                };
                api.next_adaptive_batch(&session_id, &request)
                    .await
                    .map(|response| {
                        (
                            response.current_batch,
                            response.difficulty_level,
                            response.previous_score_percent,
                        )
                    })
            }
        };

        let (questions, difficulty, previous_score_percent) = match fetched {
            Ok(batch) if !batch.0.is_empty() => batch,
            Ok(_) => {
                self.load_state = LoadState::Failed;
                return Err(QuizError::InvalidResponse(
                    "question batch contained no questions".to_string(),
                ));
            }
            Err(e) => {
                tracing::error!("Failed to load batch for session {}: {}", session_id, e);
                self.load_state = LoadState::Failed;
                return Err(e);
            }
        };

        let mut state = SavedProgress::new(phase, difficulty);
        state.previous_score_percent = previous_score_percent;
        state.questions = questions;

        self.state = state;
        self.last_result = None;
        self.load_state = LoadState::Loaded;
        self.persist().await;
        self.persist_session().await;
        Ok(())
    }

    fn validate_session(&self) -> Result<()> {
        if self.session.session_id.trim().is_empty() {
            return Err(QuizError::Validation("sessionId is required".to_string()));
        }
        if self.session.total_questions == 0 {
            return Err(QuizError::Validation(
                "totalQuestions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn ensure_not_paused(&self) -> Result<()> {
        if self.pause.is_paused() {
            return Err(QuizError::Paused);
        }
        Ok(())
    }

    fn active_question(&self) -> Result<&Question> {
        if self.load_state != LoadState::Loaded {
            return Err(QuizError::NoActiveBatch);
        }
        if !self.state.phase.is_active() {
            return Err(QuizError::Validation(
                "This batch is already complete".to_string(),
            ));
        }
        self.state.current_question().ok_or(QuizError::NoActiveBatch)
    }

    fn transition_to(&mut self, next: Phase) -> Result<()> {
        if !self.state.phase.can_transition_to(next) {
            return Err(QuizError::InvalidTransition {
                from: self.state.phase,
                to: next,
            });
        }
        tracing::debug!(
            "Session {} phase {} -> {}",
            self.session.session_id,
            self.state.phase,
            next
        );
        self.state.phase = next;
        Ok(())
    }

    /// Graded outcomes in the order the user answered.
    fn graded_outcomes(&self, result: &SubmitResponse) -> Vec<bool> {
        let by_question: HashMap<&str, bool> = result
            .graded
            .iter()
            .map(|graded| (graded.question_id.as_str(), graded.is_correct))
            .collect();

        self.state
            .answers
            .iter()
            .filter_map(|answer| by_question.get(answer.question_id.as_str()).copied())
            .collect()
    }

    /// Overwrites the snapshot with one that has no questions, so a graded
    /// batch is never offered for resume and submitted twice.
    async fn forget_graded_batch(&self, session_id: &str) {
        let finished = SavedProgress::new(Phase::Completed, self.state.current_difficulty);
        if let Err(e) = self.progress_service.save(session_id, &finished).await {
            tracing::error!(
                "Graded session {} is still stored and may be resubmitted on resume: {}",
                session_id,
                e
            );
        }
    }

    async fn persist_session(&self) {
        if let Err(e) = self.progress_service.save_session(&self.session).await {
            tracing::warn!(
                "Failed to save session descriptor {}: {}",
                self.session.session_id,
                e
            );
        }
    }

    async fn persist(&self) {
        if let Err(e) = self
            .progress_service
            .save(&self.session.session_id, &self.state)
            .await
        {
            tracing::warn!(
                "Failed to save progress for session {}: {}",
                self.session.session_id,
                e
            );
        }
    }
}
