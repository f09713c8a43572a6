use async_trait::async_trait;
use reqwest::{header::RETRY_AFTER, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{QuizError, Result};
use crate::metrics::track_api_request;
use crate::models::api::{
    AdaptiveBatchResponse, NextBatchRequest, QuestionsResponse, ReviewResponse,
    SimulatedExamRequest, StartQuizRequest, StartQuizResponse, SubmitRequest, SubmitResponse,
    Topic,
};
use crate::utils::rate_limit::{RateDecision, RateLimiter};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

pub const TRACE_ID_HEADER: &str = "x-trace-id";
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// The remote quiz service: question batches, grading and review.
#[async_trait]
pub trait QuizApi: Send + Sync {
    async fn list_topics(&self) -> Result<Vec<Topic>>;

    async fn start_quiz(&self, req: &StartQuizRequest) -> Result<StartQuizResponse>;

    async fn start_simulated_exam(&self, req: &SimulatedExamRequest)
        -> Result<StartQuizResponse>;

    /// Mixed-difficulty batch for the skill assessment.
    async fn fetch_initial_batch(&self, session_id: &str) -> Result<QuestionsResponse>;

    async fn next_adaptive_batch(
        &self,
        session_id: &str,
        req: &NextBatchRequest,
    ) -> Result<AdaptiveBatchResponse>;

    async fn submit_answers(&self, session_id: &str, req: &SubmitRequest)
        -> Result<SubmitResponse>;

    async fn review(&self, session_id: &str) -> Result<ReviewResponse>;
}

/// [`QuizApi`] over HTTP with retries and a client-side rate limit.
pub struct HttpQuizApi {
    http_client: Client,
    base_url: Url,
    quiz_path: Vec<String>,
    auth_token: Option<String>,
    retry: RetryConfig,
    submit_retry: RetryConfig,
    limiter: Arc<RateLimiter>,
}

impl HttpQuizApi {
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            QuizError::Validation(format!("Invalid API base URL {}: {}", config.api_base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(QuizError::Validation(format!(
                "API base URL {} cannot carry a path",
                config.api_base_url
            )));
        }

        let http_client = Client::builder().timeout(config.request_timeout).build()?;

        let submit_retry = RetryConfig {
            max_attempts: config
                .retry
                .max_attempts
                .max(RetryConfig::aggressive().max_attempts),
            ..config.retry.clone()
        };

        Ok(Self {
            http_client,
            base_url,
            quiz_path: config
                .quiz_path
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
            auth_token: config.auth_token.clone(),
            retry: config.retry.clone(),
            submit_retry,
            limiter,
        })
    }

    /// Overrides the retry policies for fetches and for submissions.
    pub fn with_retry(mut self, retry: RetryConfig, submit_retry: RetryConfig) -> Self {
        self.retry = retry;
        self.submit_retry = submit_retry;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| QuizError::Validation("API base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(self.quiz_path.iter().map(String::as_str))
            .extend(segments);
        Ok(url)
    }

    async fn call<T, B>(
        &self,
        endpoint: &'static str,
        method: Method,
        url: Url,
        body: Option<&B>,
        idempotency_key: Option<&str>,
        retry: &RetryConfig,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        retry_async_with_config(retry.clone(), QuizError::is_retryable, || {
            let method = method.clone();
            let url = url.clone();
            async move {
                track_api_request(
                    endpoint,
                    self.send_once(endpoint, method, url, body, idempotency_key),
                )
                .await
            }
        })
        .await
        .map_err(|e| {
            tracing::error!("Quiz API call {} failed: {}", endpoint, e);
            e
        })
    }

    async fn send_once<T, B>(
        &self,
        endpoint: &'static str,
        method: Method,
        url: Url,
        body: Option<&B>,
        idempotency_key: Option<&str>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        if let RateDecision::Limited { retry_after } = self.limiter.check(endpoint) {
            return Err(QuizError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after,
            });
        }

        let trace_id = Uuid::new_v4().to_string();
        tracing::debug!("Calling quiz API: {} {} trace_id={}", method, url, trace_id);

        let mut request = self
            .http_client
            .request(method, url)
            .header(TRACE_ID_HEADER, &trace_id);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY_HEADER, key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            tracing::warn!("Quiz API rejected credentials for {}: {}", endpoint, status);
            return Err(QuizError::Unauthorized {
                status: status.as_u16(),
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            return Err(QuizError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after,
            });
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QuizError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| QuizError::InvalidResponse(format!("{}: {}", endpoint, e)))
    }
}

#[async_trait]
impl QuizApi for HttpQuizApi {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let url = self.endpoint(&["topics"])?;
        self.call::<_, ()>("topics", Method::GET, url, None, None, &self.retry)
            .await
    }

    async fn start_quiz(&self, req: &StartQuizRequest) -> Result<StartQuizResponse> {
        req.validate()?;
        let url = self.endpoint(&["start"])?;

        let response: StartQuizResponse = self
            .call("start", Method::POST, url, Some(req), None, &self.retry)
            .await?;

        tracing::info!(
            "Quiz started: session={}, topic={}, questions={}",
            response.session_id,
            response.topic,
            response.total_questions
        );
        Ok(response)
    }

    async fn start_simulated_exam(
        &self,
        req: &SimulatedExamRequest,
    ) -> Result<StartQuizResponse> {
        req.validate()?;
        let url = self.endpoint(&["simulated-exam"])?;

        let response: StartQuizResponse = self
            .call("simulated-exam", Method::POST, url, Some(req), None, &self.retry)
            .await?;

        tracing::info!(
            "Simulated exam started: session={}, topics={}, questions={}",
            response.session_id,
            response.topic,
            response.total_questions
        );
        Ok(response)
    }

    async fn fetch_initial_batch(&self, session_id: &str) -> Result<QuestionsResponse> {
        let url = self.endpoint(&["questions", session_id])?;
        self.call::<_, ()>("questions", Method::GET, url, None, None, &self.retry)
            .await
    }

    async fn next_adaptive_batch(
        &self,
        session_id: &str,
        req: &NextBatchRequest,
    ) -> Result<AdaptiveBatchResponse> {
        req.validate()?;
        let url = self.endpoint(&[session_id, "next-adaptive-batch"])?;
        self.call(
            "next-adaptive-batch",
            Method::POST,
            url,
            Some(req),
            None,
            &self.retry,
        )
        .await
    }

    async fn submit_answers(
        &self,
        session_id: &str,
        req: &SubmitRequest,
    ) -> Result<SubmitResponse> {
        let url = self.endpoint(&[session_id, "submit"])?;
        // Same key across retries so the grader can drop duplicates
        let idempotency_key = format!("{}:{}", session_id, Uuid::new_v4());

        let response: SubmitResponse = self
            .call(
                "submit",
                Method::POST,
                url,
                Some(req),
                Some(&idempotency_key),
                &self.submit_retry,
            )
            .await?;

        tracing::info!(
            "Answers graded: session={}, correct={}, wrong={}, score={:.1}%",
            session_id,
            response.correct,
            response.wrong,
            response.score_percent
        );
        Ok(response)
    }

    async fn review(&self, session_id: &str) -> Result<ReviewResponse> {
        let url = self.endpoint(&[session_id, "review"])?;
        self.call::<_, ()>("review", Method::GET, url, None, None, &self.retry)
            .await
    }
}
