//! Parameter History
//!
//! Append-only log of feedback cycles, bounded to the most recent entries.
//! The rate limiter reads it to find a parameter's previous value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::recommendation::Recommendation;
use super::trade::PerformanceInsights;

/// Maximum history entries to keep
pub const MAX_HISTORY_ENTRIES: usize = 100;

/// One completed feedback cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub recommendations: Vec<Recommendation>,
    pub performance_insights: PerformanceInsights,
    pub performance_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterHistory {
    entries: VecDeque<HistoryEntry>,
}

impl ParameterHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, dropping the oldest once full
    pub fn push(&mut self, entry: HistoryEntry) {
        while self.entries.len() >= MAX_HISTORY_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent value recommended for `parameter`, scanning newest first
    pub fn previous_value(&self, parameter: &str) -> Option<f64> {
        self.entries.iter().rev().find_map(|entry| {
            entry
                .recommendations
                .iter()
                .find(|r| r.parameter_name == parameter)
                .map(|r| r.recommended_value)
        })
    }

    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
