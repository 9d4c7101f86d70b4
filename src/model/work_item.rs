use serde::{Deserialize, Serialize};

/// A work item read from the tracking store. The export pipeline never
/// mutates one; everything here is populated by the store client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u32,
    /// Type name as the store reports it (e.g. "Bug").
    pub work_item_type: String,
    /// Field values in the order the store reports them. Values are
    /// heterogeneous (text, rich text, identity, date, numeric), so they are
    /// kept as raw JSON until the sanitizer flattens them.
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub value: serde_json::Value,
}

/// One revision of a work item, fetched separately from the item itself.
/// Only the History text matters to the export; the store client drops the
/// rest of the revision's fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub length: u64,
    pub uri: String,
}

/// A link on a work item: either to another work item or to an external
/// artifact (e.g. a test result) addressed by an opaque URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Link {
    Related { target_id: u32 },
    External { artifact_uri: String },
}

impl WorkItem {
    pub fn field_value(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    /// Flatten a field value to text. Missing and null fields become the
    /// empty string; non-string values render the way the store would
    /// display them.
    pub fn field_text(&self, name: &str) -> String {
        match self.field_value(name) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn item_with_fields(fields: Vec<(&str, serde_json::Value)>) -> WorkItem {
        WorkItem {
            id: 7,
            work_item_type: "Bug".into(),
            fields: fields
                .into_iter()
                .map(|(name, value)| Field {
                    name: name.into(),
                    value,
                })
                .collect(),
            attachments: vec![],
            links: vec![],
        }
    }

    #[test]
    fn field_text_for_string_value() {
        let item = item_with_fields(vec![("Title", json!("Login broken"))]);
        assert_eq!(item.field_text("Title"), "Login broken");
    }

    #[test]
    fn field_text_for_missing_and_null_values() {
        let item = item_with_fields(vec![("State", serde_json::Value::Null)]);
        assert_eq!(item.field_text("State"), "");
        assert_eq!(item.field_text("Nonexistent"), "");
    }

    #[test]
    fn field_text_for_numeric_value() {
        let item = item_with_fields(vec![("Priority", json!(2))]);
        assert_eq!(item.field_text("Priority"), "2");
    }

    #[test]
    fn link_serialization_round_trips() {
        let link = Link::External {
            artifact_uri: "vstfs:///TestManagement/TcmResult/12.3".into(),
        };
        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("external"));
        let back: Link = serde_json::from_str(&json).unwrap();
        match back {
            Link::External { artifact_uri } => {
                assert_eq!(artifact_uri, "vstfs:///TestManagement/TcmResult/12.3")
            }
            _ => panic!("wrong variant"),
        }
    }
}
