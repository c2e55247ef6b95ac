//! EC2 tag handling shared by taggable resources

use crate::api::{Ec2Api, Tag};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use stratus_cloud::{FieldKind, FieldSchema, ResourceData, Result, string_map};

pub const TAGS: &str = "tags";

pub fn schema() -> FieldSchema {
    FieldSchema::new(TAGS, FieldKind::StringMap)
}

/// Tags as the attribute value kept in state
pub fn tags_value(tags: &[Tag]) -> Value {
    let map: Map<String, Value> = tags
        .iter()
        .map(|t| (t.key.clone(), Value::String(t.value.clone())))
        .collect();
    Value::Object(map)
}

/// Tags to create and tag keys to remove when going from `old` to `new`
///
/// Changed values are only created; EC2 overwrites the existing value.
pub fn diff_tags(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> (Vec<Tag>, Vec<String>) {
    let create = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| Tag::new(k.clone(), v.clone()))
        .collect();
    let remove = old
        .keys()
        .filter(|k| !new.contains_key(*k))
        .cloned()
        .collect();
    (create, remove)
}

/// Bring the remote tags of `d.id()` in line with the declared ones
pub async fn set_tags(ec2: &dyn Ec2Api, d: &ResourceData) -> Result<()> {
    if !d.has_change(TAGS) {
        return Ok(());
    }
    let (old, new) = d.get_change(TAGS);
    let (create, remove) = diff_tags(&string_map(old), &string_map(new));

    if !remove.is_empty() {
        tracing::debug!("Removing tags {:?} from {}", remove, d.id());
        ec2.delete_tags(d.id(), &remove).await?;
    }
    if !create.is_empty() {
        tracing::debug!("Creating tags {:?} on {}", create, d.id());
        ec2.create_tags(d.id(), &create).await?;
    }
    Ok(())
}
