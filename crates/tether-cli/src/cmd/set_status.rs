//! `tether set-status`: commit a victim's case status through the
//! optimistic committer, exactly as an inline table edit would.

use std::path::Path;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tether_core::config::load_project_config;
use tether_core::{CommitterConfig, OptimisticCommitter, SyncKey, SyncSnapshot, SyncStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::backend::HttpFieldBackend;
use crate::output::{CliError, OutputMode, pretty_kv, pretty_section, render_error, render_mode};
use crate::record::CaseStatus;

#[derive(Args, Debug)]
pub struct SetStatusArgs {
    /// API base URL, e.g. `http://localhost:8000/api`.
    #[arg(long)]
    pub endpoint: String,

    /// Record id.
    #[arg(long)]
    pub id: String,

    /// New status. Repeat to replay rapid edits; only the last one is sent.
    #[arg(long = "status", value_enum, required = true)]
    pub statuses: Vec<CaseStatus>,

    /// Status currently stored on the server, restored if the save fails.
    #[arg(long)]
    pub current: Option<String>,

    #[arg(long, default_value = "crimes")]
    pub collection: String,

    #[arg(long, default_value = "status")]
    pub field: String,
}

#[derive(Debug, Serialize)]
struct SetStatusOutput {
    key: String,
    requested: CaseStatus,
    edits: usize,
    committed: Option<CaseStatus>,
    status: SyncStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Schedule every requested status on one key and wait for the field to
/// settle on `saved` or `error`.
async fn commit_statuses(
    args: &SetStatusArgs,
    committer: &OptimisticCommitter<String>,
    key: &SyncKey,
) -> Option<SyncSnapshot<String>> {
    if let Some(current) = &args.current {
        let current = CaseStatus::normalize(Some(current));
        committer.seed(key, current.as_str().to_string());
    }

    let mut events = committer.subscribe();
    let backend = Arc::new(HttpFieldBackend::new(
        args.endpoint.as_str(),
        args.collection.as_str(),
        args.field.as_str(),
    ));
    for status in &args.statuses {
        committer.schedule_with(key.clone(), status.as_str().to_string(), Arc::clone(&backend));
    }

    loop {
        match events.recv().await {
            Ok(event) if &event.key == key => {
                debug!(status = ?event.status, generation = event.generation, "field event");
                if matches!(event.status, SyncStatus::Saved | SyncStatus::Error) {
                    break;
                }
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
    committer.snapshot(key)
}

/// Execute `tether set-status`.
///
/// # Errors
///
/// Returns an error if the project config is invalid or the runtime cannot
/// start. A failed save is reported on stderr and exits with status 1.
pub fn run_set_status(args: &SetStatusArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let config = load_project_config(project_root)?;
    let key = SyncKey::new("victim", &args.id).with_field(args.field.as_str());
    let requested = args.statuses.last().copied().unwrap_or_default();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build runtime")?;
    let snapshot = runtime.block_on(async {
        let committer = OptimisticCommitter::new(CommitterConfig::from(&config.autosave));
        let snapshot = commit_statuses(args, &committer, &key).await;
        committer.shutdown();
        snapshot
    });

    let out = SetStatusOutput {
        key: key.to_string(),
        requested,
        edits: args.statuses.len(),
        committed: snapshot
            .as_ref()
            .and_then(|snap| snap.committed.as_deref())
            .map(|raw| CaseStatus::normalize(Some(raw))),
        status: snapshot.as_ref().map_or(SyncStatus::Error, |snap| snap.status),
        error: snapshot.and_then(|snap| snap.last_error),
    };

    render_mode(
        output,
        &out,
        |o, w| {
            writeln!(
                w,
                "key={} requested={} edits={} status={:?}",
                o.key, o.requested, o.edits, o.status
            )?;
            match o.committed {
                Some(committed) => writeln!(w, "committed={committed}"),
                None => writeln!(w, "committed=-"),
            }
        },
        |o, w| {
            pretty_section(w, &format!("Set status {}", o.key))?;
            pretty_kv(w, "Requested", o.requested.as_str())?;
            if o.edits > 1 {
                pretty_kv(w, "Coalesced", format!("{} edits into one save", o.edits))?;
            }
            pretty_kv(
                w,
                "Committed",
                o.committed.map_or("unknown", CaseStatus::as_str),
            )?;
            let label = o.status.label();
            pretty_kv(w, "Status", if label.is_empty() { "idle" } else { label })
        },
    )?;

    if out.status == SyncStatus::Error {
        let mut error = CliError::new(
            out.error
                .unwrap_or_else(|| "Save did not complete".to_string()),
        );
        error.suggestion = Some("Edit the field again to retry.".to_string());
        render_error(output, &error)?;
        process::exit(1);
    }
    Ok(())
}
