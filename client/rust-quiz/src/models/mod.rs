use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

pub mod api;
pub mod progress;

pub use progress::SavedProgress;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    SkillAssessment,
    AdaptiveQuiz,
    Completed,
}

impl Phase {
    /// Phase a freshly initialized session starts in.
    pub fn initial(is_first_attempt: bool) -> Self {
        if is_first_attempt {
            Phase::SkillAssessment
        } else {
            Phase::AdaptiveQuiz
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::SkillAssessment => "skill-assessment",
            Phase::AdaptiveQuiz => "adaptive-quiz",
            Phase::Completed => "completed",
        }
    }

    pub fn is_active(&self) -> bool {
        !matches!(self, Phase::Completed)
    }

    pub fn title(&self) -> &'static str {
        match self {
            Phase::SkillAssessment => "Skill assessment",
            Phase::AdaptiveQuiz => "Adaptive quiz",
            Phase::Completed => "Quiz complete",
        }
    }

    pub fn can_transition_to(&self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::SkillAssessment, Phase::Completed)
                | (Phase::AdaptiveQuiz, Phase::Completed)
                | (Phase::Completed, Phase::AdaptiveQuiz)
        )
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(format!("Invalid difficulty: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: String,
    pub text: String,
    pub choices: Vec<String>,
    pub topic: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRecord {
    pub question_id: String,
    pub selected_answer: String,
}

/// A single topic, or several for a simulated exam.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TopicSelection {
    Single(String),
    Many(Vec<String>),
}

impl fmt::Display for TopicSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicSelection::Single(topic) => f.write_str(topic),
            TopicSelection::Many(topics) => f.write_str(&topics.join(", ")),
        }
    }
}

/// Stored next to the snapshot so a resumed session knows how it started.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    pub session_id: String,
    pub topic: TopicSelection,
    pub total_questions: u32,
    pub is_first_attempt: bool,
}

impl QuizSession {
    /// Builds a session from a `start` or `simulated-exam` response.
    /// No historical accuracy means the user has never attempted the topic.
    pub fn from_start(response: &api::StartQuizResponse) -> Self {
        Self {
            session_id: response.session_id.clone(),
            topic: response.topic.clone(),
            total_questions: response.total_questions,
            is_first_attempt: response.historical_accuracy.is_none(),
        }
    }

    /// Rebuilds enough of a session from a snapshot to resume it. Snapshots
    /// do not record the first-attempt flag, so it is guessed from the phase
    /// and a restart must not be offered for a session built this way.
    pub fn from_saved(session_id: &str, saved: &SavedProgress) -> Self {
        let mut topics: Vec<String> = Vec::new();
        for question in &saved.questions {
            if !topics.contains(&question.topic) {
                topics.push(question.topic.clone());
            }
        }
        let topic = if topics.len() == 1 {
            TopicSelection::Single(topics.remove(0))
        } else {
            TopicSelection::Many(topics)
        };

        Self {
            session_id: session_id.to_string(),
            topic,
            total_questions: saved.questions.len() as u32,
            is_first_attempt: saved.phase == Phase::SkillAssessment,
        }
    }
}
