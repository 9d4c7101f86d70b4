use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{TestAttachment, TestManagement, WorkItemStore};
use crate::model::work_item::{Attachment, Field, Link, Revision, WorkItem};

const API_VERSION: &str = "7.0";
const HISTORY_REFERENCE: &str = "System.History";

/// Batch size for the work-item expansion request; the server caps ids per
/// request at 200.
const ID_BATCH: usize = 200;

/// REST client for a TFS / Azure DevOps style work-item store.
///
/// Field display names and the test-attachment index are loaded once at
/// connect time so that everything the attachment resolver needs is
/// available without further round trips.
pub struct TfsStore {
    base_url: String,
    project: String,
    auth_header: String,
    client: reqwest::Client,
    field_names: HashMap<String, String>,
    test_index: HashMap<String, TestAttachment>,
}

impl TfsStore {
    pub async fn connect(collection_url: &str, project: &str, pat: &str) -> Result<Self> {
        let creds = format!(":{pat}");
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        let mut store = Self {
            base_url: collection_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            auth_header: format!("Basic {encoded}"),
            client: reqwest::Client::new(),
            field_names: HashMap::new(),
            test_index: HashMap::new(),
        };
        store.field_names = store.load_field_names().await?;
        store.test_index = store.load_test_index().await?;
        Ok(store)
    }

    fn project_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}?api-version={}",
            self.base_url,
            urlencoding::encode(&self.project),
            path,
            API_VERSION
        )
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .header("Authorization", &self.auth_header)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("request to {url} rejected"))?;
        resp.json()
            .await
            .with_context(|| format!("failed to parse response from {url}"))
    }

    /// Reference-name to display-name map for the collection's fields, so
    /// exported columns read "Title" rather than "System.Title".
    async fn load_field_names(&self) -> Result<HashMap<String, String>> {
        let url = format!(
            "{}/_apis/wit/fields?api-version={}",
            self.base_url, API_VERSION
        );
        let fields: FieldListResponse = self.get_json(&url).await?;
        Ok(fields
            .value
            .into_iter()
            .map(|f| (f.reference_name, f.name))
            .collect())
    }

    /// Artifact-URI index of test attachments for the project. External
    /// links on bugs are resolved against this without network I/O.
    async fn load_test_index(&self) -> Result<HashMap<String, TestAttachment>> {
        let url = self.project_url("_apis/test/attachments");
        let attachments: TestAttachmentListResponse = self.get_json(&url).await?;
        let index: HashMap<String, TestAttachment> = attachments
            .value
            .into_iter()
            .map(|a| {
                (
                    a.artifact_uri,
                    TestAttachment {
                        name: a.file_name,
                        uri: a.url,
                    },
                )
            })
            .collect();
        debug!(attachments = index.len(), "loaded test attachment index");
        Ok(index)
    }

}

#[async_trait]
impl WorkItemStore for TfsStore {
    fn project(&self) -> &str {
        &self.project
    }

    async fn query_bugs(&self) -> Result<Vec<WorkItem>> {
        let wiql = format!(
            "SELECT [System.Id], [System.WorkItemType], [System.State], \
             [System.AssignedTo], [System.Title] FROM WorkItems \
             WHERE [System.TeamProject] = '{}' AND [System.WorkItemType] = 'Bug' \
             ORDER BY [System.WorkItemType], [System.Id]",
            self.project
        );
        let url = self.project_url("_apis/wit/wiql");
        let resp = self
            .client
            .post(&url)
            .header("Authorization", &self.auth_header)
            .json(&json!({ "query": wiql }))
            .send()
            .await
            .context("WIQL query failed")?
            .error_for_status()
            .context("WIQL query rejected")?;
        let query: WiqlResponse = resp.json().await.context("failed to parse WIQL response")?;

        let ids: Vec<u32> = query.work_items.iter().map(|r| r.id).collect();
        let mut by_id: HashMap<u32, WorkItem> = HashMap::new();
        for chunk in ids.chunks(ID_BATCH) {
            let id_list = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let url = format!(
                "{}/_apis/wit/workitems?ids={}&$expand=relations&api-version={}",
                self.base_url, id_list, API_VERSION
            );
            let batch: WorkItemListResponse = self.get_json(&url).await?;
            for resp in batch.value {
                let item = work_item_from_response(&self.field_names, resp);
                by_id.insert(item.id, item);
            }
        }

        // Server (WIQL) order drives the export row order.
        Ok(ids.into_iter().filter_map(|id| by_id.remove(&id)).collect())
    }

    async fn get_work_item(&self, id: u32) -> Result<WorkItem> {
        let url = format!(
            "{}/_apis/wit/workitems/{}?api-version={}",
            self.base_url, id, API_VERSION
        );
        let resp: WorkItemResponse = self.get_json(&url).await?;
        Ok(work_item_from_response(&self.field_names, resp))
    }

    /// One request per work item, so callers fetch revisions only for items
    /// whose history they actually need.
    async fn revision_history(&self, id: u32) -> Result<Vec<Revision>> {
        let url = format!(
            "{}/_apis/wit/workItems/{}/revisions?api-version={}",
            self.base_url, id, API_VERSION
        );
        let revisions: RevisionListResponse = self.get_json(&url).await?;
        Ok(revisions_from_response(revisions))
    }

    async fn download(&self, uri: &str, dest: &Path) -> Result<()> {
        let resp = self
            .client
            .get(uri)
            .header("Authorization", &self.auth_header)
            .send()
            .await
            .with_context(|| format!("download of {uri} failed"))?
            .error_for_status()
            .with_context(|| format!("download of {uri} rejected"))?;
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {uri}"))?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        Ok(())
    }
}

impl TestManagement for TfsStore {
    fn find_attachment_by_link(&self, artifact_uri: &str) -> Option<TestAttachment> {
        self.test_index.get(artifact_uri).cloned()
    }
}

#[derive(Deserialize)]
struct WiqlResponse {
    #[serde(rename = "workItems", default)]
    work_items: Vec<WiqlRef>,
}

#[derive(Deserialize)]
struct WiqlRef {
    id: u32,
}

#[derive(Deserialize)]
struct FieldListResponse {
    value: Vec<FieldResponse>,
}

#[derive(Deserialize)]
struct FieldResponse {
    name: String,
    #[serde(rename = "referenceName")]
    reference_name: String,
}

#[derive(Deserialize)]
struct WorkItemListResponse {
    value: Vec<WorkItemResponse>,
}

#[derive(Deserialize)]
struct WorkItemResponse {
    id: u32,
    /// Keyed by reference name; serde_json's preserve_order feature keeps
    /// the server's field ordering, which the field catalog relies on.
    fields: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    relations: Vec<RelationResponse>,
}

#[derive(Deserialize)]
struct RelationResponse {
    rel: String,
    url: String,
    #[serde(default)]
    attributes: RelationAttributes,
}

#[derive(Deserialize, Default)]
struct RelationAttributes {
    name: Option<String>,
    #[serde(rename = "resourceSize")]
    resource_size: Option<u64>,
}

#[derive(Deserialize)]
struct RevisionListResponse {
    value: Vec<RevisionResponse>,
}

#[derive(Deserialize)]
struct RevisionResponse {
    fields: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct TestAttachmentListResponse {
    value: Vec<TestAttachmentResponse>,
}

#[derive(Deserialize)]
struct TestAttachmentResponse {
    #[serde(rename = "fileName")]
    file_name: String,
    url: String,
    #[serde(rename = "artifactUri")]
    artifact_uri: String,
}

fn display_name<'a>(field_names: &'a HashMap<String, String>, reference: &'a str) -> &'a str {
    field_names
        .get(reference)
        .map(String::as_str)
        .unwrap_or(reference)
}

fn work_item_from_response(
    field_names: &HashMap<String, String>,
    resp: WorkItemResponse,
) -> WorkItem {
    let work_item_type = resp
        .fields
        .get("System.WorkItemType")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let fields = resp
        .fields
        .iter()
        .map(|(reference, value)| Field {
            name: display_name(field_names, reference).to_string(),
            value: value.clone(),
        })
        .collect();

    let mut attachments = Vec::new();
    let mut links = Vec::new();
    for relation in resp.relations {
        match relation.rel.as_str() {
            "AttachedFile" => attachments.push(Attachment {
                name: relation.attributes.name.unwrap_or_default(),
                length: relation.attributes.resource_size.unwrap_or(0),
                uri: relation.url,
            }),
            "ArtifactLink" => links.push(Link::External {
                artifact_uri: relation.url,
            }),
            // Work-item link types carry namespaced reference names
            // ("System.LinkTypes.Related", custom "<ns>.<name>-Forward").
            // Flat rels like "Hyperlink" point outside the work-item graph;
            // their URLs must not be mistaken for work-item URLs even when
            // they happen to end in digits.
            rel if rel.contains('.') => match related_target_id(&relation.url) {
                Some(target_id) => links.push(Link::Related { target_id }),
                None => debug!(rel, url = %relation.url, "skipping unrecognized relation"),
            },
            rel => debug!(rel, url = %relation.url, "skipping non-work-item relation"),
        }
    }

    WorkItem {
        id: resp.id,
        work_item_type,
        fields,
        attachments,
        links,
    }
}

/// Work-item relations point at the target item's API URL; the id is the
/// trailing path segment.
fn related_target_id(url: &str) -> Option<u32> {
    url.rsplit('/').next()?.parse().ok()
}

fn revisions_from_response(resp: RevisionListResponse) -> Vec<Revision> {
    resp.value
        .into_iter()
        .map(|rev| Revision {
            history: rev
                .fields
                .get(HISTORY_REFERENCE)
                .and_then(|v| v.as_str())
                .map(String::from),
        })
        .collect()
}
