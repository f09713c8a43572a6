#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use learnly_quiz::{
    error::{QuizError, Result},
    models::{
        api::{
            AdaptiveBatchResponse, GradedAnswer, NextBatchRequest, QuestionsResponse,
            ReviewResponse, SimulatedExamRequest, StartQuizRequest, StartQuizResponse,
            SubmitRequest, SubmitResponse, Topic,
        },
        Difficulty, Question, QuizSession, TopicSelection,
    },
    services::{
        progress_service::ProgressService,
        progress_store::{MemoryStore, ProgressStore},
        quiz_api::QuizApi,
        session_controller::SessionController,
    },
};

pub const CORRECT_CHOICE: &str = "right";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// `count` questions whose first choice is always the correct one.
pub fn questions(count: usize, difficulty: Difficulty) -> Vec<Question> {
    (1..=count)
        .map(|i| Question {
            question_id: format!("q{}", i),
            text: format!("What is {} + {}?", i, i),
            choices: vec![
                CORRECT_CHOICE.to_string(),
                "wrong-a".to_string(),
                "wrong-b".to_string(),
            ],
            topic: "algebra".to_string(),
            difficulty,
        })
        .collect()
}

pub fn session(session_id: &str, total_questions: u32, is_first_attempt: bool) -> QuizSession {
    QuizSession {
        session_id: session_id.to_string(),
        topic: TopicSelection::Single("algebra".to_string()),
        total_questions,
        is_first_attempt,
    }
}

pub fn controller(
    api: Arc<MockQuizApi>,
    store: Arc<MemoryStore>,
    session: QuizSession,
) -> SessionController {
    controller_with_store(api, store, session)
}

pub fn controller_with_store(
    api: Arc<MockQuizApi>,
    store: Arc<dyn ProgressStore>,
    session: QuizSession,
) -> SessionController {
    init_tracing();
    SessionController::new(
        session,
        api,
        ProgressService::new(store),
        Difficulty::Medium,
    )
}

/// In-memory store whose deletes can be switched to fail.
#[derive(Default)]
pub struct StickyStore {
    pub inner: MemoryStore,
    fail_deletes: AtomicBool,
}

impl StickyStore {
    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProgressStore for StickyStore {
    async fn load(&self, key: &str) -> Result<Option<String>> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, value: &str) -> Result<()> {
        self.inner.save(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(QuizError::Storage(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "store is read-only",
            )));
        }
        self.inner.delete(key).await
    }
}

/// Scripted quiz service. Grades `CORRECT_CHOICE` as right and anything else
/// as wrong; failures can be queued per endpoint.
pub struct MockQuizApi {
    batch_size: usize,
    next_difficulty: Option<Difficulty>,
    failures: Mutex<HashMap<&'static str, VecDeque<QuizError>>>,
    calls: Mutex<Vec<&'static str>>,
    submissions: Mutex<Vec<SubmitRequest>>,
    adaptive_requests: Mutex<Vec<(Difficulty, u32)>>,
}

impl MockQuizApi {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            next_difficulty: Some(Difficulty::Hard),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            adaptive_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_next(&self, endpoint: &'static str, error: QuizError) {
        self.failures
            .lock()
            .unwrap()
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == endpoint)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn adaptive_requests(&self) -> Vec<(Difficulty, u32)> {
        self.adaptive_requests.lock().unwrap().clone()
    }

    fn record(&self, endpoint: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(endpoint);
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn grade(&self, req: &SubmitRequest) -> SubmitResponse {
        let graded: Vec<GradedAnswer> = req
            .responses
            .iter()
            .map(|answer| GradedAnswer {
                question_id: answer.question_id.clone(),
                correct_answer: CORRECT_CHOICE.to_string(),
                selected_answer: answer.selected_answer.clone(),
                is_correct: answer.selected_answer == CORRECT_CHOICE,
                explanation: None,
            })
            .collect();
        let correct = graded.iter().filter(|g| g.is_correct).count() as u32;
        let total = graded.len() as u32;

        SubmitResponse {
            correct,
            wrong: total - correct,
            graded,
            total_attempted: total,
            score_percent: if total == 0 {
                0.0
            } else {
                correct as f64 * 100.0 / total as f64
            },
            next_difficulty: self.next_difficulty,
        }
    }
}

#[async_trait]
impl QuizApi for MockQuizApi {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        self.record("topics")?;
        Ok(vec![Topic {
            topic_id: "algebra".to_string(),
            name: "Algebra".to_string(),
        }])
    }

    async fn start_quiz(&self, req: &StartQuizRequest) -> Result<StartQuizResponse> {
        self.record("start")?;
        Ok(StartQuizResponse {
            session_id: "session-1".to_string(),
            topic: TopicSelection::Single(req.topic.clone()),
            total_questions: req.num_questions,
            message: None,
            historical_accuracy: None,
        })
    }

    async fn start_simulated_exam(
        &self,
        req: &SimulatedExamRequest,
    ) -> Result<StartQuizResponse> {
        self.record("simulated-exam")?;
        Ok(StartQuizResponse {
            session_id: "exam-1".to_string(),
            topic: TopicSelection::Many(req.topics.clone()),
            total_questions: req.num_questions,
            message: None,
            historical_accuracy: Some(0.5),
        })
    }

    async fn fetch_initial_batch(&self, session_id: &str) -> Result<QuestionsResponse> {
        self.record("questions")?;
        Ok(QuestionsResponse {
            session_id: session_id.to_string(),
            current_batch: questions(self.batch_size, Difficulty::Medium),
            remaining: 0,
        })
    }

    async fn next_adaptive_batch(
        &self,
        session_id: &str,
        req: &NextBatchRequest,
    ) -> Result<AdaptiveBatchResponse> {
        self.record("next-adaptive-batch")?;
        self.adaptive_requests
            .lock()
            .unwrap()
            .push((req.difficulty, req.num_questions));
        Ok(AdaptiveBatchResponse {
            session_id: session_id.to_string(),
            current_batch: questions(self.batch_size, req.difficulty),
            remaining: 0,
            difficulty_level: req.difficulty,
            previous_score_percent: None,
        })
    }

    async fn submit_answers(
        &self,
        _session_id: &str,
        req: &SubmitRequest,
    ) -> Result<SubmitResponse> {
        self.record("submit")?;
        self.submissions.lock().unwrap().push(req.clone());
        Ok(self.grade(req))
    }

    async fn review(&self, session_id: &str) -> Result<ReviewResponse> {
        self.record("review")?;
        let last = self.submissions.lock().unwrap().last().cloned();
        let graded = last.map(|req| self.grade(&req)).unwrap_or_else(|| SubmitResponse {
            correct: 0,
            wrong: 0,
            graded: Vec::new(),
            total_attempted: 0,
            score_percent: 0.0,
            next_difficulty: None,
        });
        Ok(ReviewResponse {
            session_id: session_id.to_string(),
            graded: graded.graded,
            score_percent: Some(graded.score_percent),
        })
    }
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{}", addr)
}
