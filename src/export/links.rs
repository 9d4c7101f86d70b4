use anyhow::Result;

use crate::model::work_item::{Link, WorkItem};
use crate::store::WorkItemStore;

/// Render `"{type} : {id}"` for every work item linked to this one.
/// External artifact links are not work items and do not appear here.
pub async fn summarize_linked_items(
    store: &dyn WorkItemStore,
    item: &WorkItem,
) -> Result<Vec<String>> {
    let mut summaries = Vec::new();
    for link in &item.links {
        if let Link::Related { target_id } = link {
            let target = store.get_work_item(*target_id).await?;
            summaries.push(format!("{} : {}", target.work_item_type, target.id));
        }
    }
    Ok(summaries)
}
