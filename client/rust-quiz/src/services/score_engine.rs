//! Streak-driven gamification: rank tiers, point multiplier and running score.
//!
//! Everything here is pure. The controller feeds graded outcomes in answer
//! order and keeps the resulting [`ScoreState`] in memory only.

use serde::{Deserialize, Serialize};
use std::fmt;

pub const POINTS_PER_CORRECT: u64 = 100;
pub const MAX_MULTIPLIER: u32 = 6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Rank {
    E,
    D,
    C,
    B,
    A,
    S,
    #[serde(rename = "S+")]
    SPlus,
}

impl Rank {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::E => "E",
            Rank::D => "D",
            Rank::C => "C",
            Rank::B => "B",
            Rank::A => "A",
            Rank::S => "S",
            Rank::SPlus => "S+",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// (rank, minimum streak, fraction of the batch), highest rank first.
const RANK_THRESHOLDS: [(Rank, u32, f64); 7] = [
    (Rank::SPlus, 8, 0.90),
    (Rank::S, 7, 0.75),
    (Rank::A, 6, 0.60),
    (Rank::B, 5, 0.45),
    (Rank::C, 4, 0.35),
    (Rank::D, 3, 0.25),
    (Rank::E, 2, 0.15),
];

fn threshold(floor: u32, fraction: f64, total_questions: u32) -> u32 {
    let scaled = (total_questions as f64 * fraction).floor() as u32;
    floor.max(scaled)
}

/// Highest rank whose threshold the streak meets, `E` otherwise.
pub fn rank(streak: u32, total_questions: u32) -> Rank {
    RANK_THRESHOLDS
        .iter()
        .find(|(_, floor, fraction)| streak >= threshold(*floor, *fraction, total_questions))
        .map(|(rank, _, _)| *rank)
        .unwrap_or(Rank::E)
}

pub fn multiplier(streak: u32) -> u32 {
    (1 + streak / 2).min(MAX_MULTIPLIER)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreState {
    pub streak: u32,
    pub max_streak: u32,
    pub rank: Rank,
    pub multiplier: u32,
    pub total_score: u64,
}

impl Default for ScoreState {
    fn default() -> Self {
        Self {
            streak: 0,
            max_streak: 0,
            rank: Rank::E,
            multiplier: 1,
            total_score: 0,
        }
    }
}

impl ScoreState {
    pub fn apply_correct_answer(self, total_questions: u32) -> Self {
        let streak = self.streak + 1;
        let multiplier = multiplier(streak);
        Self {
            streak,
            max_streak: self.max_streak.max(streak),
            rank: rank(streak, total_questions),
            multiplier,
            total_score: self.total_score + POINTS_PER_CORRECT * multiplier as u64,
        }
    }

    pub fn apply_wrong_answer(self, total_questions: u32) -> Self {
        Self {
            streak: 0,
            rank: rank(0, total_questions),
            multiplier: 1,
            ..self
        }
    }

    pub fn apply(self, is_correct: bool, total_questions: u32) -> Self {
        if is_correct {
            self.apply_correct_answer(total_questions)
        } else {
            self.apply_wrong_answer(total_questions)
        }
    }

    /// Folds a sequence of graded outcomes, in answer order, into the state.
    pub fn replay<I>(self, outcomes: I, total_questions: u32) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        outcomes
            .into_iter()
            .fold(self, |state, correct| state.apply(correct, total_questions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_is_monotonic_in_streak() {
        for total in [0, 1, 5, 10, 20, 37, 100] {
            let mut previous = rank(0, total);
            for streak in 1..=120 {
                let current = rank(streak, total);
                assert!(
                    current >= previous,
                    "rank dropped from {} to {} at streak {} (total {})",
                    previous,
                    current,
                    streak,
                    total
                );
                previous = current;
            }
        }
    }

    #[test]
    fn rank_thresholds_for_small_batches_use_floors() {
        assert_eq!(rank(0, 5), Rank::E);
        assert_eq!(rank(2, 5), Rank::E);
        assert_eq!(rank(3, 5), Rank::D);
        assert_eq!(rank(4, 5), Rank::C);
        assert_eq!(rank(5, 5), Rank::B);
        assert_eq!(rank(8, 5), Rank::SPlus);
    }

    #[test]
    fn rank_thresholds_scale_with_large_batches() {
        // 20 questions: S+ needs max(8, 18) = 18, S needs max(7, 15) = 15
        assert_eq!(rank(17, 20), Rank::S);
        assert_eq!(rank(18, 20), Rank::SPlus);
        // A needs max(6, 12) = 12
        assert_eq!(rank(11, 20), Rank::B);
        assert_eq!(rank(12, 20), Rank::A);
    }

    #[test]
    fn multiplier_is_bounded_and_non_decreasing() {
        let mut previous = multiplier(0);
        assert_eq!(previous, 1);
        for streak in 0..200 {
            let m = multiplier(streak);
            assert!((1..=MAX_MULTIPLIER).contains(&m));
            assert!(m >= previous);
            previous = m;
        }
        assert_eq!(multiplier(10), 6);
        assert_eq!(multiplier(1000), 6);
    }

    #[test]
    fn wrong_answer_resets_streak_but_keeps_score() {
        let state = ScoreState::default().replay([true, true, true, true], 10);
        let after = state.apply_wrong_answer(10);

        assert_eq!(after.streak, 0);
        assert_eq!(after.rank, Rank::E);
        assert_eq!(after.multiplier, 1);
        assert_eq!(after.total_score, state.total_score);
        assert_eq!(after.max_streak, state.max_streak);
    }

    #[test]
    fn three_correct_answers_use_multipliers_of_new_streak() {
        // streaks 1, 2, 3 pay x1, x2, x2
        let state = ScoreState::default().replay([true, true, true], 10);
        assert_eq!(state.total_score, 500);
        assert_eq!(state.multiplier, 2);
        assert_eq!(state.streak, 3);
        assert_eq!(state.max_streak, 3);
    }

    #[test]
    fn score_matches_sum_of_multipliers() {
        for n in 0..30u32 {
            let state = ScoreState::default().replay(std::iter::repeat(true).take(n as usize), 10);
            let expected: u64 = (1..=n).map(|i| 100 * multiplier(i) as u64).sum();
            assert_eq!(state.total_score, expected, "n = {}", n);
        }
    }

    #[test]
    fn max_streak_survives_later_streaks() {
        let state = ScoreState::default().replay([true, true, true, false, true], 10);
        assert_eq!(state.streak, 1);
        assert_eq!(state.max_streak, 3);
    }

    #[test]
    fn rank_serializes_with_plus_sign() {
        assert_eq!(serde_json::to_string(&Rank::SPlus).unwrap(), "\"S+\"");
        assert_eq!(Rank::SPlus.to_string(), "S+");
    }
}
