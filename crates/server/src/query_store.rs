//! Hand-off slot for the most recently submitted query.

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

/// A client query accepted for answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    text: String,
    accepted_at: DateTime<Utc>,
}

impl Query {
    /// Returns `None` for an empty query.
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text,
            accepted_at: Utc::now(),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn accepted_at(&self) -> DateTime<Utc> {
        self.accepted_at
    }
}

/// Single-slot store shared by the submission and stream handlers.
///
/// Every `set` overwrites the previous query; `get` never clears it. Readers
/// observe whichever write landed last before them.
#[derive(Debug, Default)]
pub struct QueryStore {
    slot: RwLock<Option<Query>>,
}

impl QueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, query: Query) {
        *self.slot.write().await = Some(query);
    }

    pub async fn get(&self) -> Option<Query> {
        self.slot.read().await.clone()
    }

    pub async fn is_empty(&self) -> bool {
        self.slot.read().await.is_none()
    }
}
