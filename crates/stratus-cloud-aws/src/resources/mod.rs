//! CRUD handlers of the AWS resource types
//!
//! Each submodule exposes `resource()`, the [`ResourceType`] registered by
//! [`crate::provider::registry`]. Handlers only talk to AWS through the
//! traits in [`crate::api`].
//!
//! [`ResourceType`]: stratus_cloud::ResourceType

pub mod elb;
pub mod internet_gateway;
pub mod launch_configuration;
pub mod s3_bucket;
pub mod tags;

use serde_json::Value;
use stratus_cloud::{CloudError, ResourceData, Result};

/// String field that validation guarantees to be present
fn required_str(d: &ResourceData, key: &str) -> Result<String> {
    d.get_str(key)
        .map(str::to_string)
        .ok_or_else(|| CloudError::InvalidConfig(format!("{}: {key} is required", d.resource_type())))
}

/// String field, treating an empty string as unset
fn optional_str(d: &ResourceData, key: &str) -> Option<String> {
    d.get_ok(key).and_then(Value::as_str).map(str::to_string)
}

/// Whether the declared configuration mentions `key` at all
fn declares(d: &ResourceData, key: &str) -> bool {
    d.declared().is_some_and(|c| c.contains_key(key))
}
