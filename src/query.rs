//! Incoming question

use crate::error::{InsightError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MIN_QUERY_CHARS: usize = 1;
pub const MAX_QUERY_CHARS: usize = 500;

/// A validated natural-language question. Immutable once constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    id: Uuid,
    text: String,
    received_at: DateTime<Utc>,
}

impl Query {
    /// Validate and wrap raw text. Surrounding whitespace is trimmed before
    /// the length check.
    pub fn parse(raw: &str) -> Result<Self> {
        let text = raw.trim();
        let chars = text.chars().count();
        if chars < MIN_QUERY_CHARS {
            return Err(InsightError::InvalidQuery("query is empty".to_string()));
        }
        if chars > MAX_QUERY_CHARS {
            return Err(InsightError::InvalidQuery(format!(
                "query is {} characters long, the limit is {}",
                chars, MAX_QUERY_CHARS
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            text: text.to_string(),
            received_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trims() {
        let q = Query::parse("  total sales?  ").unwrap();
        assert_eq!(q.text(), "total sales?");
    }

    #[test]
    fn test_parse_rejects_blank_and_long() {
        assert!(Query::parse("   ").is_err());
        assert!(Query::parse(&"a".repeat(MAX_QUERY_CHARS + 1)).is_err());
        assert!(Query::parse(&"a".repeat(MAX_QUERY_CHARS)).is_ok());
    }

    #[test]
    fn test_parse_stamps_arrival_time() {
        let before = Utc::now();
        let q = Query::parse("total sales?").unwrap();
        assert!(q.received_at() >= before);
        assert!(q.received_at() <= Utc::now());
    }
}
