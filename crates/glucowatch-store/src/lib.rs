//! Local data persistence for glucowatch.
//!
//! This crate provides SQLite-based storage for the sensor status snapshot
//! and the glucose reading history.
//!
//! # Features
//!
//! - Key/value snapshot table (the serialized sensor status)
//! - Glucose reading history per user, with alert flag and comment
//! - Query by user, time range, alerts only, with pagination
//!
//! # Example
//!
//! ```no_run
//! use glucowatch_store::{ReadingQuery, Store};
//!
//! let store = Store::open_default()?;
//!
//! let query = ReadingQuery::new()
//!     .user("u1")
//!     .alerts_only()
//!     .limit(10);
//! let readings = store.query_readings(&query)?;
//! # Ok::<(), glucowatch_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::StoredReading;
pub use queries::ReadingQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/glucowatch/data.db`
/// - macOS: `~/Library/Application Support/glucowatch/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\glucowatch\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("glucowatch")
        .join("data.db")
}
