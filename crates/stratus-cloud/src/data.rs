//! Declarative state of a single resource instance
//!
//! [`ResourceRecord`] is the durable snapshot the orchestrator stores between
//! runs. [`ResourceData`] is the accessor a handler works through during one
//! operation: it layers the values observed during the call over the declared
//! configuration over the prior state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Attribute values keyed by declarative field name
pub type Attributes = BTreeMap<String, Value>;

/// Logical state of a remote object as last observed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalState {
    Available,
    Attaching,
    Attached,
    Detaching,
    Detached,
    #[default]
    Unknown,
}

impl LogicalState {
    /// Parse a remote state label; labels outside the known set map to `Unknown`
    pub fn parse(label: &str) -> Self {
        match label {
            "available" => LogicalState::Available,
            "attaching" => LogicalState::Attaching,
            "attached" => LogicalState::Attached,
            "detaching" => LogicalState::Detaching,
            "detached" => LogicalState::Detached,
            _ => LogicalState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicalState::Available => "available",
            LogicalState::Attaching => "attaching",
            LogicalState::Attached => "attached",
            LogicalState::Detaching => "detaching",
            LogicalState::Detached => "detached",
            LogicalState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LogicalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one remote object
///
/// `id` is empty before the first successful create and after the object has
/// been confirmed absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Resource type (e.g., "aws_internet_gateway")
    pub resource_type: String,

    /// Remote-assigned identifier
    #[serde(default)]
    pub id: String,

    /// Last observed logical state
    #[serde(default)]
    pub logical_state: LogicalState,

    /// Attribute values
    #[serde(default)]
    pub attributes: Attributes,
}

impl ResourceRecord {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Accessor over the declarative state of one resource during one operation
#[derive(Debug, Clone, Default)]
pub struct ResourceData {
    resource_type: String,
    id: String,
    logical_state: LogicalState,
    prior: Attributes,
    declared: Option<Attributes>,
    observed: Attributes,
}

impl ResourceData {
    /// Data for a resource that has not been created yet
    pub fn for_create(resource_type: impl Into<String>, declared: Attributes) -> Self {
        Self {
            resource_type: resource_type.into(),
            declared: Some(declared),
            ..Default::default()
        }
    }

    /// Data for refreshing or deleting a known resource
    pub fn from_record(record: ResourceRecord) -> Self {
        Self {
            resource_type: record.resource_type,
            id: record.id,
            logical_state: record.logical_state,
            prior: record.attributes,
            ..Default::default()
        }
    }

    /// Data for moving a known resource to a new declared configuration
    pub fn for_update(record: ResourceRecord, declared: Attributes) -> Self {
        Self {
            declared: Some(declared),
            ..Self::from_record(record)
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Mark the remote object as gone
    pub fn clear_id(&mut self) {
        self.id.clear();
        self.logical_state = LogicalState::Unknown;
    }

    pub fn logical_state(&self) -> LogicalState {
        self.logical_state
    }

    pub fn set_logical_state(&mut self, state: LogicalState) {
        self.logical_state = state;
    }

    /// Declared configuration, if this operation carries one
    pub fn declared(&self) -> Option<&Attributes> {
        self.declared.as_ref()
    }

    pub(crate) fn declared_mut(&mut self) -> Option<&mut Attributes> {
        self.declared.as_mut()
    }

    /// Current value: observed during this call, else declared, else prior
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.observed
            .get(key)
            .or_else(|| self.declared.as_ref().and_then(|d| d.get(key)))
            .or_else(|| self.prior.get(key))
            .filter(|v| !v.is_null())
    }

    /// Current value if it is set to something other than its zero value
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !is_zero(v))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        string_list(self.get(key))
    }

    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        string_map(self.get(key))
    }

    /// Deserialize the current value into `T`
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> crate::Result<Option<T>> {
        match self.get(key) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    /// Record a value observed during this call
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.observed.insert(key.into(), value.into());
    }

    /// Prior and declared value of `key`
    ///
    /// Without a declared configuration both sides are the prior value.
    pub fn get_change(&self, key: &str) -> (Option<&Value>, Option<&Value>) {
        let old = self.prior.get(key).filter(|v| !v.is_null());
        let new = match &self.declared {
            Some(declared) => declared.get(key).filter(|v| !v.is_null()),
            None => old,
        };
        (old, new)
    }

    /// Prior value of a string attribute; empty when unset
    pub fn old_str(&self, key: &str) -> &str {
        self.get_change(key).0.and_then(Value::as_str).unwrap_or("")
    }

    pub fn has_change(&self, key: &str) -> bool {
        let (old, new) = self.get_change(key);
        normalized(old) != normalized(new)
    }

    /// Snapshot to persist after the operation
    pub fn into_record(self) -> ResourceRecord {
        let mut attributes = self.prior;
        if let Some(declared) = self.declared {
            attributes.extend(declared);
        }
        attributes.extend(self.observed);
        attributes.retain(|_, v| !v.is_null());

        ResourceRecord {
            resource_type: self.resource_type,
            id: self.id,
            logical_state: self.logical_state,
            attributes,
        }
    }
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Treat an absent value and a zero value as the same thing
fn normalized(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !is_zero(v))
}

pub fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
