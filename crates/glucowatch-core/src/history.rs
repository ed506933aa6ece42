//! History reconciliation for acknowledged glucose alerts.
//!
//! A reading that already has a persisted identifier is updated in place.
//! Offline placeholders, readings without an id, and readings whose update
//! fails are inserted as new records instead. Nothing here returns an error:
//! a failed insert is logged and reported as [`ReconcileOutcome::Failed`].

use std::sync::Arc;

use tracing::{error, info, warn};

use glucowatch_types::{GlucoseAlert, GlucoseAlertType};

use crate::traits::{HistoryStore, ReadingUpdate};

/// How an acknowledged alert ended up in history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The existing record was updated.
    Updated { id: String },
    /// A new record was inserted.
    Inserted { id: String },
    /// The alert could not be persisted.
    Failed,
}

impl ReconcileOutcome {
    /// The record id, if persisted.
    pub fn id(&self) -> Option<&str> {
        match self {
            ReconcileOutcome::Updated { id } | ReconcileOutcome::Inserted { id } => Some(id),
            ReconcileOutcome::Failed => None,
        }
    }
}

/// Comment stored with an alert reading that has none.
pub fn alert_comment(alert: &GlucoseAlert) -> String {
    let label = match alert.alert_type {
        GlucoseAlertType::High => "High",
        GlucoseAlertType::Low => "Low",
    };
    format!("{} glucose alert: {:.0} mg/dL", label, alert.reading.value)
}

/// Folds acknowledged alerts into the reading history.
#[derive(Clone)]
pub struct HistoryReconciler {
    store: Arc<dyn HistoryStore>,
}

impl HistoryReconciler {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    /// Persist the alert's reading with `is_alert = true`.
    pub async fn commit(&self, alert: &GlucoseAlert) -> ReconcileOutcome {
        let reading = &alert.reading;
        let comment = reading
            .comment
            .clone()
            .filter(|comment| !comment.trim().is_empty())
            .unwrap_or_else(|| alert_comment(alert));

        if let Some(id) = reading.id.as_deref().filter(|_| !reading.is_offline()) {
            let update = ReadingUpdate {
                is_alert: true,
                comment: Some(comment.clone()),
            };
            match self.store.update(&reading.user_id, id, &update).await {
                Ok(()) => {
                    info!("Marked reading {} as alert", id);
                    return ReconcileOutcome::Updated { id: id.to_string() };
                }
                Err(e) => warn!("Failed to update reading {}, inserting instead: {}", id, e),
            }
        }

        let mut record = reading.clone();
        record.id = None;
        record.is_alert = Some(true);
        record.comment = Some(comment);

        match self.store.insert(&reading.user_id, &record).await {
            Ok(id) => {
                info!("Saved alert reading {}", id);
                ReconcileOutcome::Inserted { id }
            }
            Err(e) => {
                error!("Failed to save alert reading for {}: {}", reading.user_id, e);
                ReconcileOutcome::Failed
            }
        }
    }
}

impl std::fmt::Debug for HistoryReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryReconciler").finish_non_exhaustive()
    }
}
