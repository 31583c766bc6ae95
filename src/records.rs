use std::collections::{HashMap, HashSet};

use serde::{de::DeserializeOwned, Deserialize};

use crate::error::{BackupError, Result};

/// One vault folder from `bw list folders`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Folder {
    /// Folder id; the synthetic "No Folder" entry has none.
    pub id: Option<String>,
    /// Display name.
    pub name: String,
}

/// One attachment nested under an item.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment id.
    pub id: String,
    /// Original file name.
    pub file_name: String,
}

/// One vault item from `bw list items`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Item id.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Owning organization, if shared.
    #[serde(default)]
    organization_id: Option<String>,
    /// Attachments, when the item has any.
    #[serde(default)]
    pub attachments: Option<Vec<Attachment>>,
}

impl Item {
    /// Returns the owning organization id, treating empty strings as none.
    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id
            .as_deref()
            .filter(|value| !value.is_empty())
    }

    /// Returns the item's attachments, empty when the key is absent.
    pub fn attachments(&self) -> &[Attachment] {
        self.attachments.as_deref().unwrap_or_default()
    }
}

/// One organization the account belongs to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Organization {
    /// Organization id.
    pub id: String,
    /// Display name.
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct OrganizationEntry {
    name: String,
}

/// Organizations keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationDirectory {
    by_id: HashMap<String, Organization>,
}

impl OrganizationDirectory {
    /// Looks up one organization.
    pub fn get(&self, organization_id: &str) -> Option<&Organization> {
        self.by_id.get(organization_id)
    }

    /// Number of organizations listed.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true when no organizations were listed.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Parses `bw list folders` output.
pub fn parse_folders(artifact: &str, raw: &str) -> Result<Vec<Folder>> {
    parse_array(artifact, raw)
}

/// Parses `bw list items` output.
pub fn parse_items(artifact: &str, raw: &str) -> Result<Vec<Item>> {
    parse_array(artifact, raw)
}

/// Parses `bw list organizations` output.
///
/// Accepts the array the tool prints as well as an object keyed by
/// organization id.
pub fn parse_organizations(artifact: &str, raw: &str) -> Result<OrganizationDirectory> {
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map_err(|error| unexpected_shape(artifact, error))?;

    let by_id = match value {
        serde_json::Value::Array(_) => serde_json::from_value::<Vec<Organization>>(value)
            .map_err(|error| unexpected_shape(artifact, error))?
            .into_iter()
            .map(|organization| (organization.id.clone(), organization))
            .collect(),
        serde_json::Value::Object(_) => {
            serde_json::from_value::<HashMap<String, OrganizationEntry>>(value)
                .map_err(|error| unexpected_shape(artifact, error))?
                .into_iter()
                .map(|(id, entry)| {
                    let organization = Organization {
                        id: id.clone(),
                        name: entry.name,
                    };
                    (id, organization)
                })
                .collect()
        }
        other => {
            return Err(unexpected_shape(
                artifact,
                format!("expected an array or object, found {}", json_kind(&other)),
            ))
        }
    };
    Ok(OrganizationDirectory { by_id })
}

/// Returns distinct organization ids referenced by `items`, in first-seen order.
pub fn distinct_organization_ids(items: &[Item]) -> Vec<&str> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(Item::organization_id)
        .filter(|organization_id| seen.insert(*organization_id))
        .collect()
}

/// Formats one attachment manifest line (without trailing newline).
pub fn manifest_line(item: &Item, attachment: &Attachment) -> String {
    format!(
        "item_id: {} attachment_id: {} filename: {}",
        item.id, attachment.id, attachment.file_name
    )
}

/// Total number of attachments across `items`.
pub fn count_attachments(items: &[Item]) -> usize {
    items.iter().map(|item| item.attachments().len()).sum()
}

fn parse_array<T: DeserializeOwned>(artifact: &str, raw: &str) -> Result<Vec<T>> {
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .map_err(|error| unexpected_shape(artifact, error))?;
    if !value.is_array() {
        return Err(unexpected_shape(
            artifact,
            format!("expected an array, found {}", json_kind(&value)),
        ));
    }
    serde_json::from_value(value).map_err(|error| unexpected_shape(artifact, error))
}

fn unexpected_shape(artifact: &str, detail: impl std::fmt::Display) -> BackupError {
    BackupError::UnexpectedShape {
        artifact: artifact.to_owned(),
        detail: detail.to_string(),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod unit_tests {
    use super::{distinct_organization_ids, parse_items};

    #[test]
    fn distinct_organization_ids_keeps_first_seen_order() {
        let items = parse_items(
            "items.json",
            r#"[
                {"id": "1", "organizationId": "A"},
                {"id": "2", "organizationId": "B"},
                {"id": "3", "organizationId": null},
                {"id": "4", "organizationId": "A"},
                {"id": "5"},
                {"id": "6", "organizationId": "C"},
                {"id": "7", "organizationId": ""}
            ]"#,
        )
        .unwrap();
        assert_eq!(distinct_organization_ids(&items), vec!["A", "B", "C"]);
    }

    #[test]
    fn item_without_attachments_key_has_none() {
        let items = parse_items("items.json", r#"[{"id": "1", "name": "login"}]"#).unwrap();
        assert!(items[0].attachments().is_empty());
        assert_eq!(items[0].organization_id(), None);
    }
}
