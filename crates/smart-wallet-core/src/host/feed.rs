//! Aggregator-style price feeds
//!
//! A feed answers `decimals()` and `latestRoundData()`. Answers are signed;
//! the oracle gateway decides what is acceptable.

use serde::{Deserialize, Serialize};

/// Result of `latestRoundData()`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundData {
    pub round_id: u128,
    pub answer: i128,
    pub started_at: u64,
    pub updated_at: u64,
    pub answered_in_round: u128,
}

/// State of one deployed feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedState {
    pub description: String,
    pub decimals: u8,
    pub latest: RoundData,
}

impl FeedState {
    /// New feed with a first round answered at `now`
    pub fn new(description: impl Into<String>, decimals: u8, answer: i128, now: u64) -> Self {
        Self {
            description: description.into(),
            decimals,
            latest: RoundData {
                round_id: 1,
                answer,
                started_at: now,
                updated_at: now,
                answered_in_round: 1,
            },
        }
    }

    /// Publish a new round
    pub fn push_answer(&mut self, answer: i128, updated_at: u64) {
        let round_id = self.latest.round_id + 1;
        self.latest = RoundData {
            round_id,
            answer,
            started_at: updated_at,
            updated_at,
            answered_in_round: round_id,
        };
    }
}
