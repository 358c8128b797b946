//! Click analytics data models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One recorded visit of a short link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ClickEvent {
    pub ip: String,
    pub city: String,
    pub country: String,
    pub created_at: DateTime<Utc>,
}

/// All clicks of one short link, oldest first. Created on the first click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    pub short_link: String,
    pub clicks: Vec<ClickEvent>,
    /// Time of the most recent click
    pub updated_at: DateTime<Utc>,
}

/// Number of clicks sharing one value of a dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CountEntry {
    pub value: String,
    pub count: i64,
}

/// Aggregate view of an [`AnalyticsRecord`], most frequent values first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub short_link: String,
    pub total_clicks: i64,
    pub updated_at: DateTime<Utc>,
    pub by_country: Vec<CountEntry>,
    pub by_city: Vec<CountEntry>,
}

/// Header row of the `analytics` table
#[derive(Debug, Clone, FromRow)]
pub(crate) struct AnalyticsRow {
    pub id: i64,
    pub short_link: String,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_clicks() {
        let now = Utc::now();
        let record = AnalyticsRecord {
            short_link: "AbCd1234".to_string(),
            clicks: vec![ClickEvent {
                ip: "203.0.113.7".to_string(),
                city: "Lisbon".to_string(),
                country: "PT".to_string(),
                created_at: now,
            }],
            updated_at: now,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["short_link"], "AbCd1234");
        assert_eq!(json["clicks"][0]["city"], "Lisbon");
        assert!(json["updated_at"].is_string());
    }
}
