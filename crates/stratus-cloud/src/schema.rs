//! Field schema descriptors for resource types

use crate::data::{Attributes, ResourceData};
use crate::error::{CloudError, Result};
use serde_json::Value;

/// Checks a declared value; returns a reason on failure
pub type Validator = fn(&Value) -> std::result::Result<(), String>;

/// Maps a declared value to the value kept in state
pub type StateFunc = fn(&Value) -> Value;

/// Value type of a field
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Bool,
    Int,
    StringList,
    /// Unordered list of unique strings
    StringSet,
    StringMap,
    /// List of nested blocks
    List(Vec<FieldSchema>),
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::StringList => "list of strings",
            FieldKind::StringSet => "set of strings",
            FieldKind::StringMap => "map of strings",
            FieldKind::List(_) => "list of blocks",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldKind::String => value.is_string(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::StringList | FieldKind::StringSet => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            FieldKind::StringMap => value
                .as_object()
                .is_some_and(|map| map.values().all(Value::is_string)),
            FieldKind::List(_) => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_object)),
        }
    }
}

/// Declarative field definition
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Set by the remote side when not declared
    pub computed: bool,
    /// Changing this field requires replacing the remote object
    pub force_new: bool,
    pub default: Option<Value>,
    pub validate: Option<Validator>,
    pub state_func: Option<StateFunc>,
}

impl FieldSchema {
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            computed: false,
            force_new: false,
            default: None,
            validate: None,
            state_func: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(mut self, validator: Validator) -> Self {
        self.validate = Some(validator);
        self
    }

    pub fn state_func(mut self, func: StateFunc) -> Self {
        self.state_func = Some(func);
        self
    }

    fn check(&self, path: &str, value: &Value) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        if !self.kind.accepts(value) {
            return Err(CloudError::InvalidConfig(format!(
                "{path}: expected {}",
                self.kind.describe()
            )));
        }
        if let Some(validate) = self.validate {
            validate(value).map_err(|reason| CloudError::InvalidConfig(format!("{path}: {reason}")))?;
        }
        if let (FieldKind::List(nested), Some(items)) = (&self.kind, value.as_array()) {
            for (i, item) in items.iter().enumerate() {
                if let Some(block) = item.as_object() {
                    let block: Attributes = block.clone().into_iter().collect();
                    check_fields(&format!("{path}[{i}]."), nested, &block)?;
                }
            }
        }
        Ok(())
    }
}

fn check_fields(prefix: &str, fields: &[FieldSchema], config: &Attributes) -> Result<()> {
    for key in config.keys() {
        if !fields.iter().any(|f| f.name == key) {
            return Err(CloudError::InvalidConfig(format!("{prefix}{key}: unknown field")));
        }
    }

    for field in fields {
        let path = format!("{prefix}{}", field.name);
        match config.get(field.name) {
            Some(value) if !value.is_null() => field.check(&path, value)?,
            _ if field.required => {
                return Err(CloudError::InvalidConfig(format!("{path}: required field is missing")));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Schema of one resource type
#[derive(Debug, Clone, Default)]
pub struct ResourceSchema {
    pub fields: Vec<FieldSchema>,
}

impl ResourceSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: FieldSchema) -> Self {
        self.fields.push(field);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validate a declared configuration
    pub fn validate(&self, config: &Attributes) -> Result<()> {
        check_fields("", &self.fields, config)
    }

    /// Fill in defaults for fields that are not declared
    pub fn apply_defaults(&self, config: &mut Attributes) {
        for field in &self.fields {
            if let Some(default) = &field.default {
                let missing = config.get(field.name).is_none_or(Value::is_null);
                if missing {
                    config.insert(field.name.to_string(), default.clone());
                }
            }
        }
    }

    /// Mark every undeclared field the caller owns as removed
    ///
    /// Computed fields are left out so the remote side keeps its value.
    pub fn clear_undeclared(&self, config: &mut Attributes) {
        for field in self.fields.iter().filter(|f| !f.computed) {
            config.entry(field.name.to_string()).or_insert(Value::Null);
        }
    }

    /// Apply each field's state function to a declared configuration
    pub fn normalize(&self, config: &mut Attributes) {
        for field in &self.fields {
            if let (Some(func), Some(value)) = (field.state_func, config.get_mut(field.name)) {
                if !value.is_null() {
                    *value = func(value);
                }
            }
        }
    }

    /// Whether this type can be changed in place at all
    pub fn is_updatable(&self) -> bool {
        self.fields.iter().any(|f| !f.force_new && !f.computed)
    }

    /// `force_new` fields whose declared value differs from state
    pub fn replacement_fields(&self, d: &ResourceData) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.force_new && self.declares_change(d, f))
            .map(|f| f.name)
            .collect()
    }

    /// In-place updatable fields whose declared value differs from state
    pub fn updated_fields(&self, d: &ResourceData) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| !f.force_new && self.declares_change(d, f))
            .map(|f| f.name)
            .collect()
    }

    fn declares_change(&self, d: &ResourceData, field: &FieldSchema) -> bool {
        // An undeclared computed field keeps whatever the remote side chose
        if field.computed && d.declared().is_some_and(|c| !c.contains_key(field.name)) {
            return false;
        }
        d.has_change(field.name)
    }
}
