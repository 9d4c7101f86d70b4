pub mod tfs;

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::work_item::{Revision, WorkItem};

/// A resolved test-management attachment: the name it was uploaded under
/// and the URI its bytes can be fetched from.
#[derive(Debug, Clone)]
pub struct TestAttachment {
    pub name: String,
    pub uri: String,
}

/// The tracking-store collaborator. The export pipeline only reads through
/// this boundary; mutation of work items happens elsewhere.
#[async_trait]
pub trait WorkItemStore: Send + Sync {
    /// The team project this connection is scoped to.
    fn project(&self) -> &str;

    /// All "Bug" work items of the project, in server order
    /// (type, then id).
    async fn query_bugs(&self) -> Result<Vec<WorkItem>>;

    /// Resolve one work item by id (used for linked-item summaries).
    async fn get_work_item(&self, id: u32) -> Result<WorkItem>;

    /// The full revision history of one work item, oldest first. Fetched
    /// on demand so exports that do not include the history column pay
    /// nothing for it.
    async fn revision_history(&self, id: u32) -> Result<Vec<Revision>>;

    /// Fetch the resource at `uri` with the connection's credentials and
    /// write it to `dest`, overwriting any existing file.
    async fn download(&self, uri: &str, dest: &Path) -> Result<()>;
}

/// The test-management collaborator: an index from external-link artifact
/// URIs to their test attachments. Lookup is synchronous on purpose;
/// implementations load the index up front so attachment resolution never
/// blocks on network I/O.
pub trait TestManagement: Send + Sync {
    fn find_attachment_by_link(&self, artifact_uri: &str) -> Option<TestAttachment>;
}
