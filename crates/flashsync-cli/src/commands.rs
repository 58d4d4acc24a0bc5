//! Subcommand execution

use anyhow::Result;
use flashsync_core::{FilterLevel, LocalStateStore, RowId, Session, SyncCoordinator, SyncStatus};
use flashsync_store::DocumentStore;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One CLI invocation against a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Load the dataset, restoring remote ratings into local state
    Pull {
        /// Dataset file name
        dataset: String,
        /// Restrict restored ratings to these rows
        rows: Option<BTreeSet<RowId>>,
    },
    /// Rate one row
    Rate {
        /// Dataset file name
        dataset: String,
        /// Row to rate
        row: RowId,
        /// 0..=5
        stars: u8,
    },
    /// Save the 1-based view position
    Position {
        /// Dataset file name
        dataset: String,
        /// Row number
        row: u32,
    },
    /// Change view settings
    Settings {
        /// Dataset file name
        dataset: String,
        /// New rating filter
        filter_level: Option<FilterLevel>,
        /// New sort preference
        sort_by_stars: Option<bool>,
    },
    /// Print stored ratings and settings
    Dump {
        /// Dataset file name
        dataset: String,
    },
}

impl Action {
    fn dataset(&self) -> &str {
        match self {
            Self::Pull { dataset, .. }
            | Self::Rate { dataset, .. }
            | Self::Position { dataset, .. }
            | Self::Settings { dataset, .. }
            | Self::Dump { dataset } => dataset,
        }
    }
}

/// Run `action` and return a JSON summary for printing
///
/// # Errors
/// - invalid stars or row numbers
/// - local state that cannot be written
pub async fn execute<S, L>(action: Action, coordinator: SyncCoordinator<S>, local: Arc<L>) -> Result<Value>
where
    S: DocumentStore,
    L: LocalStateStore,
{
    let rows = match &action {
        Action::Pull { rows, .. } => rows.clone(),
        _ => None,
    };
    let (mut session, report) = Session::load(coordinator, local, action.dataset(), rows).await;
    if !report.remote_available {
        tracing::warn!(dataset = %session.dataset(), "Remote store unavailable, using local state");
    }

    match action {
        Action::Pull { .. } => Ok(json!({
            "dataset": session.dataset(),
            "load": report,
            "ratings": session.ratings().len(),
        })),
        Action::Rate { row, stars, .. } => {
            let outcome = session.set_rating(&row, stars).await?;
            Ok(json!({
                "key": outcome.key,
                "stars": stars,
                "status": outcome.status.label(),
            }))
        }
        Action::Position { row, .. } => {
            let outcome = session.save_view_position(row).await?;
            Ok(json!({
                "lastViewedRow": row,
                "status": status_label(outcome.success),
            }))
        }
        Action::Settings {
            filter_level,
            sort_by_stars,
            ..
        } => {
            let mut synced = true;
            if let Some(level) = filter_level {
                synced &= session.set_filter_level(level).await?.success;
            }
            if let Some(sort) = sort_by_stars {
                synced &= session.set_sort_by_stars(sort).await?.success;
            }
            Ok(json!({
                "view": session.view(),
                "status": status_label(synced),
            }))
        }
        Action::Dump { .. } => {
            let ratings: Map<String, Value> = session
                .ratings()
                .iter()
                .map(|(row, stars)| {
                    let status = session.sync_status(&RowId::from(row.as_str()));
                    (row.clone(), json!({ "stars": stars, "status": status.label() }))
                })
                .collect();
            Ok(json!({
                "dataset": session.dataset(),
                "namespace": session.namespace().as_str(),
                "remoteAvailable": report.remote_available,
                "view": session.view(),
                "ratings": ratings,
            }))
        }
    }
}

fn status_label(synced: bool) -> &'static str {
    let status = if synced { SyncStatus::Synced } else { SyncStatus::Local };
    status.label()
}
