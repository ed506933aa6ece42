//! Query builder for glucose readings.
//!
//! # Example
//!
//! ```
//! use glucowatch_store::{ReadingQuery, Store};
//! use time::{Duration, OffsetDateTime};
//!
//! let store = Store::open_in_memory()?;
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! // Alert readings from the last day, newest first
//! let query = ReadingQuery::new()
//!     .user("u1")
//!     .since(yesterday)
//!     .alerts_only()
//!     .limit(50);
//!
//! let readings = store.query_readings(&query)?;
//! assert!(readings.is_empty());
//! # Ok::<(), glucowatch_store::Error>(())
//! ```

use time::OffsetDateTime;

/// Fluent query builder for stored readings.
///
/// Use this to construct queries for [`Store::query_readings`](crate::Store::query_readings).
/// By default, queries return results ordered by `timestamp` descending
/// (newest first).
#[derive(Debug, Default, Clone)]
pub struct ReadingQuery {
    /// Filter by user ID.
    pub user_id: Option<String>,
    /// Include only readings at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Include only readings at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Include only readings that raised an alert.
    pub alerts_only: bool,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order by timestamp descending (newest first).
    pub newest_first: bool,
}

impl ReadingQuery {
    /// Create a new query: all users, no time range, no limit, newest first.
    pub fn new() -> Self {
        Self {
            newest_first: true,
            ..Default::default()
        }
    }

    /// Filter by user ID.
    pub fn user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    /// Filter to readings taken at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to readings taken at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Only readings that raised an alert.
    pub fn alerts_only(mut self) -> Self {
        self.alerts_only = true;
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    ///
    /// Use with `limit()` for pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results by oldest first.
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref user_id) = self.user_id {
            conditions.push("user_id = ?");
            params.push(Box::new(user_id.clone()));
        }

        if let Some(since) = self.since {
            conditions.push("timestamp >= ?");
            params.push(Box::new(since.unix_timestamp()));
        }

        if let Some(until) = self.until {
            conditions.push("timestamp <= ?");
            params.push(Box::new(until.unix_timestamp()));
        }

        if self.alerts_only {
            conditions.push("is_alert = 1");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT id, user_id, value, timestamp, comment, is_alert, source, created_at \
             FROM readings {} ORDER BY timestamp {}, created_at {}",
            where_clause, order, order
        );

        // SQLite requires LIMIT before OFFSET.
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {}", limit)),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        sql
    }
}
