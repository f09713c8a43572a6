use serde::{Deserialize, Serialize};

use super::{AnswerRecord, Difficulty, Phase, Question};

/// Everything the controller needs to pick a session back up after a reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedProgress {
    pub current_question_index: usize,
    pub answers: Vec<AnswerRecord>,
    pub selected_answer: Option<String>,
    pub elapsed_seconds: u64,
    pub phase: Phase,
    pub current_difficulty: Difficulty,
    pub previous_score_percent: Option<f64>,
    pub questions: Vec<Question>,
}

impl SavedProgress {
    pub fn new(phase: Phase, difficulty: Difficulty) -> Self {
        Self {
            current_question_index: 0,
            answers: Vec::new(),
            selected_answer: None,
            elapsed_seconds: 0,
            phase,
            current_difficulty: difficulty,
            previous_score_percent: None,
            questions: Vec::new(),
        }
    }

    /// A snapshot is only worth resuming if it still points inside its batch.
    pub fn is_resumable(&self) -> bool {
        !self.questions.is_empty()
            && self.current_question_index < self.questions.len()
            && self.answers.len() <= self.questions.len()
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    pub fn is_last_question(&self) -> bool {
        self.current_question_index + 1 >= self.questions.len()
    }
}
