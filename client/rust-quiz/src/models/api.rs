use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{AnswerRecord, Difficulty, Question, TopicSelection};

pub const MAX_QUESTIONS_PER_REQUEST: u32 = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub topic_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartQuizRequest {
    #[validate(length(min = 1, message = "topic must not be empty"))]
    pub topic: String,
    #[validate(range(min = 1, max = 100))]
    pub num_questions: u32,
}

#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedExamRequest {
    #[validate(length(min = 1, message = "at least one topic is required"))]
    pub topics: Vec<String>,
    #[validate(range(min = 1, max = 100))]
    pub num_questions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StartQuizResponse {
    pub session_id: String,
    pub topic: TopicSelection,
    pub total_questions: u32,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub historical_accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionsResponse {
    pub session_id: String,
    pub current_batch: Vec<Question>,
    #[serde(default)]
    pub remaining: u32,
}

#[derive(Debug, Clone, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NextBatchRequest {
    pub difficulty: Difficulty,
    #[validate(range(min = 1, max = 100))]
    pub num_questions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveBatchResponse {
    pub session_id: String,
    pub current_batch: Vec<Question>,
    #[serde(default)]
    pub remaining: u32,
    pub difficulty_level: Difficulty,
    #[serde(default)]
    pub previous_score_percent: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitRequest {
    pub responses: Vec<AnswerRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GradedAnswer {
    pub question_id: String,
    pub correct_answer: String,
    pub selected_answer: String,
    pub is_correct: bool,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Result of grading a full batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub correct: u32,
    pub wrong: u32,
    pub graded: Vec<GradedAnswer>,
    pub total_attempted: u32,
    pub score_percent: f64,
    #[serde(default)]
    pub next_difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResponse {
    pub session_id: String,
    #[serde(default)]
    pub graded: Vec<GradedAnswer>,
    #[serde(default)]
    pub score_percent: Option<f64>,
}
