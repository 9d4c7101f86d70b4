pub mod attachments;
pub mod links;
pub mod sheet;


use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model::work_item::{Revision, WorkItem};
use crate::sanitize::sanitize;
use crate::store::{TestManagement, WorkItemStore};
use self::attachments::AttachmentSource;
use self::sheet::BugSheet;

/// The aggregate field: its column holds the concatenated History of every
/// revision rather than the current value.
pub const HISTORY_FIELD: &str = "History";

/// Immutable configuration for one export run.
#[derive(Debug, Clone)]
pub struct ExportJob {
    pub project: String,
    /// Selected field names; their order is the column order.
    pub selected_fields: Vec<String>,
    /// Folder receiving the workbook and any downloaded attachments.
    pub destination: PathBuf,
    pub fetch_attachments: bool,
}

impl ExportJob {
    /// The workbook path is derived, never chosen: `<folder>/<project> -
    /// Bugs.xlsx`.
    pub fn workbook_path(&self) -> PathBuf {
        self.destination.join(format!("{} - Bugs.xlsx", self.project))
    }
}

/// Progress and terminal events observed by the host while a run is in
/// flight. There is no mid-run abort; the host can only warn the operator
/// before tearing the process down.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    Progress { current: usize, total: usize },
    /// The run was rejected before any write happened; user-actionable.
    Blocked(String),
    Completed(PathBuf),
    Failed(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no fields selected for export")]
    EmptySelection,
    #[error("destination {0} is open in another program; close it and retry")]
    DestinationBlocked(PathBuf),
    #[error("spreadsheet error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("tracking store error: {0}")]
    Store(#[source] anyhow::Error),
}

impl ExportError {
    /// Rejections the operator can fix themselves, as opposed to failures
    /// of the run.
    fn is_rejection(&self) -> bool {
        matches!(
            self,
            ExportError::EmptySelection | ExportError::DestinationBlocked(_)
        )
    }
}

/// Run one export end to end, emitting progress and a terminal event on
/// `events`. The returned result mirrors the terminal event for callers
/// that want an exit code.
pub async fn run(
    store: &dyn WorkItemStore,
    test_management: &dyn TestManagement,
    items: &[WorkItem],
    job: &ExportJob,
    events: mpsc::UnboundedSender<ExportEvent>,
) -> Result<PathBuf, ExportError> {
    let outcome = run_inner(store, test_management, items, job, &events).await;
    let terminal = match &outcome {
        Ok(path) => ExportEvent::Completed(path.clone()),
        Err(e) if e.is_rejection() => ExportEvent::Blocked(e.to_string()),
        Err(e) => ExportEvent::Failed(e.to_string()),
    };
    let _ = events.send(terminal);
    outcome
}

async fn run_inner(
    store: &dyn WorkItemStore,
    test_management: &dyn TestManagement,
    items: &[WorkItem],
    job: &ExportJob,
    events: &mpsc::UnboundedSender<ExportEvent>,
) -> Result<PathBuf, ExportError> {
    if job.selected_fields.is_empty() {
        return Err(ExportError::EmptySelection);
    }

    // Destination validation happens before any row work.
    std::fs::create_dir_all(&job.destination)?;
    let mut sheet = BugSheet::open(&job.workbook_path())?;
    sheet.write_header(&job.selected_fields)?;

    let sources = attachments::sources(test_management);
    let total = items.len();
    for (index, item) in items.iter().enumerate() {
        if job.fetch_attachments {
            fetch_item_attachments(store, &sources, item, job).await;
        }
        let row = build_row(store, item, &job.selected_fields).await?;
        sheet.append_row(&row)?;
        let _ = events.send(ExportEvent::Progress {
            current: index + 1,
            total,
        });
    }

    info!(
        items = total,
        range = %sheet.used_range(),
        "export written, saving workbook"
    );
    sheet.finalize()
}

/// Resolve and download every attachment the three sources produce for one
/// item. A failed download is logged and skipped; one broken attachment
/// never takes down the run.
async fn fetch_item_attachments(
    store: &dyn WorkItemStore,
    sources: &[Box<dyn AttachmentSource + '_>],
    item: &WorkItem,
    job: &ExportJob,
) {
    for source in sources {
        for task in source.tasks(item) {
            let dest = job.destination.join(&task.file_name);
            if let Err(e) = store.download(&task.source_uri, &dest).await {
                warn!(
                    work_item = task.work_item_id,
                    source = source.name(),
                    file = %task.file_name,
                    error = %e,
                    "skipping attachment"
                );
            }
        }
    }
}

async fn build_row(
    store: &dyn WorkItemStore,
    item: &WorkItem,
    selected_fields: &[String],
) -> Result<Vec<String>, ExportError> {
    let mut row = Vec::with_capacity(selected_fields.len() + 1);
    for name in selected_fields {
        if name == HISTORY_FIELD {
            // Revisions are a separate request per item; only pay for it
            // when the history column was actually selected.
            let revisions = store
                .revision_history(item.id)
                .await
                .map_err(ExportError::Store)?;
            row.push(sanitize(&combined_history(&revisions)));
        } else {
            row.push(sanitize(&item.field_text(name)));
        }
    }

    let linked = links::summarize_linked_items(store, item)
        .await
        .map_err(ExportError::Store)?;
    let mut summary = String::new();
    for entry in linked {
        summary.push_str(&entry);
        summary.push('\n');
    }
    row.push(summary);
    Ok(row)
}

/// Every revision's History, oldest to newest, each non-empty entry
/// followed by a line break. Sanitization is applied by the caller to the
/// concatenation, not per revision.
fn combined_history(revisions: &[Revision]) -> String {
    let mut history = String::new();
    for revision in revisions {
        if let Some(text) = revision.history.as_deref() {
            if !text.is_empty() {
                history.push_str(text);
                history.push('\n');
            }
        }
    }
    history
}
