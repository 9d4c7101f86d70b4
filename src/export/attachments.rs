use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::model::work_item::{Link, WorkItem};
use crate::store::TestManagement;

/// The rich-text field scanned for embedded image links, resolved by
/// display name. Resolving it by numeric field index breaks the moment the
/// store reorders its fields.
pub const REPRO_STEPS_FIELD: &str = "Repro Steps";

/// One attachment to download: where to fetch it and what to call the
/// local file. Tasks carry no retry state; each is attempted exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentTask {
    pub work_item_id: u32,
    /// Local file name, `"<id> - <name>"`.
    pub file_name: String,
    pub source_uri: String,
}

impl AttachmentTask {
    fn new(work_item_id: u32, name: &str, source_uri: String) -> Self {
        Self {
            work_item_id,
            file_name: format!("{work_item_id} - {name}"),
            source_uri,
        }
    }
}

/// One way of finding downloadable attachments on a work item. The three
/// strategies are independent and additive: an item may yield tasks from
/// all of them. Resolution is pure over the item (plus the pre-loaded test
/// index) and never touches the network.
pub trait AttachmentSource: Send + Sync {
    fn name(&self) -> &'static str;
    fn tasks(&self, item: &WorkItem) -> Vec<AttachmentTask>;
}

/// Every strategy: direct attachments first, then embedded images, then
/// test artifacts.
pub fn sources<'a>(test_management: &'a dyn TestManagement) -> Vec<Box<dyn AttachmentSource + 'a>> {
    vec![
        Box::new(DirectAttachments),
        Box::new(EmbeddedImageLinks),
        Box::new(ExternalTestArtifacts { test_management }),
    ]
}

/// Files attached directly to the work item.
pub struct DirectAttachments;

impl AttachmentSource for DirectAttachments {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn tasks(&self, item: &WorkItem) -> Vec<AttachmentTask> {
        item.attachments
            .iter()
            .map(|a| {
                debug!(work_item = item.id, name = %a.name, bytes = a.length, "direct attachment");
                AttachmentTask::new(item.id, &a.name, a.uri.clone())
            })
            .collect()
    }
}

/// Images embedded in the repro-steps rich text. Only `src` URIs carrying a
/// `fileName` query token are download candidates; the local name is
/// whatever follows the last `fileName=`.
pub struct EmbeddedImageLinks;

fn img_src_pattern() -> &'static Regex {
    static IMG_SRC: OnceLock<Regex> = OnceLock::new();
    IMG_SRC.get_or_init(|| {
        Regex::new(r#"(?is)<img[^>]*?src\s*=\s*["']?([^'" >]+?)[ '"][^>]*?>"#)
            .expect("img pattern is valid")
    })
}

fn after_last<'a>(value: &'a str, marker: &str) -> Option<&'a str> {
    let pos = value.rfind(marker)?;
    let rest = &value[pos + marker.len()..];
    if rest.is_empty() {
        None
    } else {
        Some(rest)
    }
}

impl AttachmentSource for EmbeddedImageLinks {
    fn name(&self) -> &'static str {
        "embedded-image"
    }

    fn tasks(&self, item: &WorkItem) -> Vec<AttachmentTask> {
        let repro_steps = item.field_text(REPRO_STEPS_FIELD);
        img_src_pattern()
            .captures_iter(&repro_steps)
            .filter_map(|caps| {
                let uri = caps.get(1)?.as_str();
                if !uri.contains("fileName") {
                    return None;
                }
                let name = after_last(uri, "fileName=")?;
                Some(AttachmentTask::new(item.id, name, uri.to_string()))
            })
            .collect()
    }
}

/// Attachments reached through external links into test management:
/// each artifact URI is looked up in the pre-loaded attachment index, and
/// unknown artifacts are simply not download candidates.
pub struct ExternalTestArtifacts<'a> {
    pub test_management: &'a dyn TestManagement,
}

impl AttachmentSource for ExternalTestArtifacts<'_> {
    fn name(&self) -> &'static str {
        "test-artifact"
    }

    fn tasks(&self, item: &WorkItem) -> Vec<AttachmentTask> {
        item.links
            .iter()
            .filter_map(|link| match link {
                Link::External { artifact_uri } => self
                    .test_management
                    .find_attachment_by_link(artifact_uri)
                    .map(|a| AttachmentTask::new(item.id, &a.name, a.uri)),
                Link::Related { .. } => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::work_item::{Attachment, Field};
    use crate::store::TestAttachment;
    use serde_json::json;

    fn bug(id: u32) -> WorkItem {
        WorkItem {
            id,
            work_item_type: "Bug".into(),
            fields: vec![],
            attachments: vec![],
            links: vec![],
        }
    }

    fn with_repro_steps(mut item: WorkItem, html: &str) -> WorkItem {
        item.fields.push(Field {
            name: REPRO_STEPS_FIELD.into(),
            value: json!(html),
        });
        item
    }

    struct StubIndex(Vec<(String, TestAttachment)>);

    impl TestManagement for StubIndex {
        fn find_attachment_by_link(&self, artifact_uri: &str) -> Option<TestAttachment> {
            self.0
                .iter()
                .find(|(uri, _)| uri == artifact_uri)
                .map(|(_, a)| a.clone())
        }
    }

    #[test]
    fn direct_attachments_become_tasks() {
        let mut item = bug(12);
        item.attachments.push(Attachment {
            name: "trace.etl".into(),
            length: 9000,
            uri: "http://tfs/attachments/1".into(),
        });
        let tasks = DirectAttachments.tasks(&item);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_name, "12 - trace.etl");
        assert_eq!(tasks[0].source_uri, "http://tfs/attachments/1");
    }

    #[test]
    fn embedded_image_with_file_name_token() {
        let item = with_repro_steps(
            bug(3),
            r#"<div>see <IMG alt="x" src="http://tfs/wit/download?fileName=report.png" /></div>"#,
        );
        let tasks = EmbeddedImageLinks.tasks(&item);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_name, "3 - report.png");
        assert_eq!(
            tasks[0].source_uri,
            "http://tfs/wit/download?fileName=report.png"
        );
    }

    #[test]
    fn embedded_image_without_token_is_skipped() {
        let item = with_repro_steps(bug(3), r#"<img src="http://example.com/logo.png" />"#);
        assert!(EmbeddedImageLinks.tasks(&item).is_empty());
    }

    #[test]
    fn embedded_image_with_empty_file_name_is_skipped() {
        let item = with_repro_steps(bug(3), r#"<img src="http://tfs/download?fileName=" />"#);
        assert!(EmbeddedImageLinks.tasks(&item).is_empty());
    }

    #[test]
    fn embedded_image_uses_last_file_name_occurrence() {
        let item = with_repro_steps(
            bug(3),
            r#"<img src="http://tfs/download?fileName=a.png&redirect=fileName=b.png" />"#,
        );
        let tasks = EmbeddedImageLinks.tasks(&item);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_name, "3 - b.png");
    }

    #[test]
    fn multiple_embedded_images_yield_multiple_tasks() {
        let item = with_repro_steps(
            bug(8),
            r#"<img src="http://tfs/d?fileName=one.png" /> text
               <img src="http://tfs/d?fileName=two.png" />"#,
        );
        let tasks = EmbeddedImageLinks.tasks(&item);
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].file_name, "8 - one.png");
        assert_eq!(tasks[1].file_name, "8 - two.png");
    }

    #[test]
    fn missing_repro_steps_field_yields_nothing() {
        assert!(EmbeddedImageLinks.tasks(&bug(3)).is_empty());
    }

    #[test]
    fn external_links_resolve_through_the_index() {
        let mut item = bug(21);
        item.links.push(Link::External {
            artifact_uri: "vstfs:///TestManagement/TcmResult/4.2".into(),
        });
        item.links.push(Link::External {
            artifact_uri: "vstfs:///TestManagement/TcmResult/unknown".into(),
        });
        item.links.push(Link::Related { target_id: 99 });

        let index = StubIndex(vec![(
            "vstfs:///TestManagement/TcmResult/4.2".into(),
            TestAttachment {
                name: "screen.avi".into(),
                uri: "http://tfs/test/attachments/55".into(),
            },
        )]);
        let source = ExternalTestArtifacts {
            test_management: &index,
        };
        let tasks = source.tasks(&item);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].file_name, "21 - screen.avi");
        assert_eq!(tasks[0].source_uri, "http://tfs/test/attachments/55");
    }

    #[test]
    fn all_three_sources_compose() {
        let index = StubIndex(vec![]);
        let sources = sources(&index);
        let names: Vec<&str> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["direct", "embedded-image", "test-artifact"]);
    }

    #[test]
    fn after_last_edge_cases() {
        assert_eq!(after_last("x?fileName=a.png", "fileName="), Some("a.png"));
        assert_eq!(after_last("x?fileName=", "fileName="), None);
        assert_eq!(after_last("no token", "fileName="), None);
    }
}
