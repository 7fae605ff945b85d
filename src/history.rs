//! In-memory record of completed prompt/response exchanges

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::HistoryConfig;

/// One completed generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    pub prompt: String,
    pub response: String,
    pub model: String,
    pub recorded_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, response: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            response: response.into(),
            model: model.into(),
            recorded_at: Utc::now(),
        }
    }
}

/// Bounded conversation history shared by all clients
#[derive(Debug)]
pub struct ConversationHistory {
    entries: Mutex<VecDeque<Exchange>>,
    enabled: bool,
    max_entries: usize,
}

impl ConversationHistory {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            enabled: config.enabled,
            max_entries: config.max_entries,
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<Exchange>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append an exchange, evicting the oldest past the limit
    pub fn record(&self, exchange: Exchange) {
        if !self.enabled {
            return;
        }
        let mut entries = self.entries();
        entries.push_back(exchange);
        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    /// Oldest first
    pub fn snapshot(&self) -> Vec<Exchange> {
        self.entries().iter().cloned().collect()
    }

    /// Drop everything; returns how many entries were removed
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(&HistoryConfig::default())
    }
}
