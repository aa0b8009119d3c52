// src/model.rs

use chrono::{DateTime, FixedOffset};

/// Timestamp of a message, carrying the offset it was written in
pub type Timestamp = DateTime<FixedOffset>;

/// A single chat message, as extracted from the export or read back from cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub user: String,
    pub message: String,
    pub created: Timestamp,
}

/// Per-user observations, one entry in each sequence per message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAggregate {
    /// 0 = Monday .. 6 = Sunday
    pub weekdays: Vec<u8>,
    /// 1 = January .. 12 = December
    pub months: Vec<u8>,
    /// 0..=23, in the message's own offset
    pub hours: Vec<u8>,
}

impl UserAggregate {
    pub fn message_count(&self) -> usize {
        // All three sequences grow together, any of them will do.
        self.hours.len()
    }
}

/// The complete results of the conversation analysis
#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// Users ordered by ascending message count, ties in order of first appearance
    pub users: Vec<(String, UserAggregate)>,
    pub total_messages: usize,
    pub first_message: Option<Timestamp>,
    pub last_message: Option<Timestamp>,
}

impl AnalysisResult {
    pub fn get(&self, user: &str) -> Option<&UserAggregate> {
        self.users.iter().find(|(name, _)| name == user).map(|(_, agg)| agg)
    }
}
