use crate::model::work_item::WorkItem;

/// Field names present on a representative work item, in the order the
/// store reports them. The caller picks a sample (typically the first item
/// of a query result); an empty result means there is nothing to select.
pub fn discover_fields(sample: &WorkItem) -> Vec<String> {
    sample.fields.iter().map(|f| f.name.clone()).collect()
}
