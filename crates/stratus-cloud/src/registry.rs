//! Resource-type registry
//!
//! Each resource type is a table of four handler functions plus a field
//! schema. The registry is built once at startup and dispatches by type
//! name; dispatch validates declared configuration and wraps handler
//! failures with the resource id and operation.

use crate::data::ResourceData;
use crate::error::{CloudError, Operation, Result};
use crate::schema::ResourceSchema;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;

/// One lifecycle operation of a resource type
///
/// `C` is the client context shared by all handlers of a provider.
pub type Handler<C> = for<'a> fn(&'a mut ResourceData, &'a C) -> BoxFuture<'a, Result<()>>;

/// Definition of one resource type
pub struct ResourceType<C> {
    pub name: &'static str,
    pub schema: ResourceSchema,
    pub create: Handler<C>,
    pub read: Handler<C>,
    /// Absent when every field forces replacement
    pub update: Option<Handler<C>>,
    pub delete: Handler<C>,
}

impl<C> ResourceType<C> {
    /// Check that the handler table is consistent with the schema
    fn check_definition(&self) -> Result<()> {
        if self.update.is_none() && self.schema.is_updatable() {
            return Err(CloudError::InvalidConfig(format!(
                "{}: fields that are not force_new require an update handler",
                self.name
            )));
        }
        Ok(())
    }
}

/// Planned change for one resource instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// Declared configuration matches state
    NoOp,
    /// The listed fields can be changed in place
    Update(Vec<&'static str>),
    /// The listed fields force a new remote object
    Replace(Vec<&'static str>),
}

/// Resource types of one provider, keyed by type name
pub struct ResourceRegistry<C> {
    types: BTreeMap<&'static str, ResourceType<C>>,
}

impl<C> Default for ResourceRegistry<C> {
    fn default() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }
}

impl<C> ResourceRegistry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource type; rejects inconsistent definitions and duplicates
    pub fn register(&mut self, resource_type: ResourceType<C>) -> Result<()> {
        resource_type.check_definition()?;
        if self.types.contains_key(resource_type.name) {
            return Err(CloudError::InvalidConfig(format!(
                "resource type {} registered twice",
                resource_type.name
            )));
        }
        self.types.insert(resource_type.name, resource_type);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&ResourceType<C>> {
        self.types
            .get(name)
            .ok_or_else(|| CloudError::ResourceTypeNotFound(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }

    /// Compare declared configuration with state
    pub fn plan_change(&self, name: &str, d: &ResourceData) -> Result<Change> {
        let resource_type = self.get(name)?;
        let mut d = d.clone();
        if let Some(declared) = d.declared_mut() {
            resource_type.schema.apply_defaults(declared);
            resource_type.schema.clear_undeclared(declared);
            resource_type.schema.normalize(declared);
        }

        if d.id().is_empty() {
            return Ok(Change::Replace(Vec::new()));
        }
        let replace = resource_type.schema.replacement_fields(&d);
        if !replace.is_empty() {
            return Ok(Change::Replace(replace));
        }
        let update = resource_type.schema.updated_fields(&d);
        if update.is_empty() {
            Ok(Change::NoOp)
        } else {
            Ok(Change::Update(update))
        }
    }

    pub async fn create(&self, name: &str, d: &mut ResourceData, client: &C) -> Result<()> {
        let resource_type = self.get(name)?;
        prepare(resource_type, d)?;
        tracing::debug!(resource_type = %name, "Dispatching create");
        let result = (resource_type.create)(d, client).await;
        finish(resource_type, Operation::Create, d, result)
    }

    pub async fn read(&self, name: &str, d: &mut ResourceData, client: &C) -> Result<()> {
        let resource_type = self.get(name)?;
        tracing::debug!(resource_type = %name, id = %d.id(), "Dispatching read");
        let result = (resource_type.read)(d, client).await;
        finish(resource_type, Operation::Read, d, result)
    }

    pub async fn update(&self, name: &str, d: &mut ResourceData, client: &C) -> Result<()> {
        let resource_type = self.get(name)?;
        let update = resource_type
            .update
            .ok_or_else(|| CloudError::UnsupportedOperation {
                resource_type: name.to_string(),
                operation: Operation::Update,
            })?;
        prepare(resource_type, d)?;
        tracing::debug!(resource_type = %name, id = %d.id(), "Dispatching update");
        let result = update(d, client).await;
        finish(resource_type, Operation::Update, d, result)
    }

    pub async fn delete(&self, name: &str, d: &mut ResourceData, client: &C) -> Result<()> {
        let resource_type = self.get(name)?;
        tracing::debug!(resource_type = %name, id = %d.id(), "Dispatching delete");
        let result = (resource_type.delete)(d, client).await;
        finish(resource_type, Operation::Delete, d, result)
    }
}

fn prepare<C>(resource_type: &ResourceType<C>, d: &mut ResourceData) -> Result<()> {
    let Some(declared) = d.declared_mut() else {
        return Err(CloudError::InvalidConfig(format!(
            "{}: no declared configuration",
            resource_type.name
        )));
    };
    resource_type.schema.apply_defaults(declared);
    resource_type.schema.validate(declared)?;
    resource_type.schema.clear_undeclared(declared);
    Ok(())
}

fn finish<C>(
    resource_type: &ResourceType<C>,
    operation: Operation,
    d: &mut ResourceData,
    result: Result<()>,
) -> Result<()> {
    match result {
        Ok(()) => {
            if let Some(declared) = d.declared_mut() {
                resource_type.schema.normalize(declared);
            }
            Ok(())
        }
        Err(err) => Err(CloudError::Operation {
            operation,
            resource_type: resource_type.name.to_string(),
            resource_id: d.id().to_string(),
            source: Box::new(err),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Attributes, ResourceRecord};
    use crate::error::{ApiError, ErrorKind};
    use crate::schema::{FieldKind, FieldSchema};
    use serde_json::{Value, json};

    struct Counter;

    fn create<'a>(d: &'a mut ResourceData, _: &'a Counter) -> BoxFuture<'a, Result<()>> {
        Box::pin(create_thing(d))
    }

    fn read<'a>(d: &'a mut ResourceData, _: &'a Counter) -> BoxFuture<'a, Result<()>> {
        Box::pin(read_thing(d))
    }

    fn update<'a>(d: &'a mut ResourceData, _: &'a Counter) -> BoxFuture<'a, Result<()>> {
        Box::pin(update_thing(d))
    }

    fn delete<'a>(d: &'a mut ResourceData, _: &'a Counter) -> BoxFuture<'a, Result<()>> {
        Box::pin(delete_thing(d))
    }

    async fn create_thing(d: &mut ResourceData) -> Result<()> {
        let name = d.get_str("name").unwrap_or_default().to_string();
        d.set_id(format!("thing-{name}"));
        Ok(())
    }

    async fn read_thing(d: &mut ResourceData) -> Result<()> {
        d.clear_id();
        Ok(())
    }

    async fn update_thing(_: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn delete_thing(_: &mut ResourceData) -> Result<()> {
        Err(ApiError::new("AccessDenied", "nope", ErrorKind::Fatal).into())
    }

    fn shout(value: &Value) -> Value {
        json!(value.as_str().unwrap_or_default().to_uppercase())
    }

    fn thing(update: Option<Handler<Counter>>) -> ResourceType<Counter> {
        ResourceType {
            name: "thing",
            schema: ResourceSchema::new()
                .field(FieldSchema::new("name", FieldKind::String).required().force_new())
                .field(FieldSchema::new("motto", FieldKind::String).state_func(shout))
                .field(FieldSchema::new("size", FieldKind::Int).default_value(1)),
            create,
            read,
            update,
            delete,
        }
    }

    fn registry() -> ResourceRegistry<Counter> {
        let mut registry = ResourceRegistry::new();
        registry.register(thing(Some(update))).unwrap();
        registry
    }

    fn attrs(value: Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_applies_defaults_and_normalizes_state() {
        let registry = registry();
        let mut d = ResourceData::for_create("thing", attrs(json!({"name": "a", "motto": "hi"})));

        registry.create("thing", &mut d, &Counter).await.unwrap();

        let record = d.into_record();
        assert_eq!(record.id, "thing-a");
        assert_eq!(record.attributes["size"], json!(1));
        assert_eq!(record.attributes["motto"], json!("HI"));
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_config() {
        let registry = registry();
        let mut d = ResourceData::for_create("thing", attrs(json!({"motto": "hi"})));

        let err = registry.create("thing", &mut d, &Counter).await.unwrap_err();
        assert!(matches!(err, CloudError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_handler_errors_carry_context() {
        let registry = registry();
        let mut d = ResourceData::from_record(ResourceRecord::new("thing", "thing-a"));

        let err = registry.delete("thing", &mut d, &Counter).await.unwrap_err();
        match &err {
            CloudError::Operation {
                operation,
                resource_id,
                ..
            } => {
                assert_eq!(*operation, Operation::Delete);
                assert_eq!(resource_id, "thing-a");
            }
            other => panic!("expected Operation, got {other:?}"),
        }
        assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("AccessDenied"));
    }

    #[tokio::test]
    async fn test_unknown_type_and_missing_update() {
        let registry = registry();
        let mut d = ResourceData::default();
        assert!(matches!(
            registry.read("nothing", &mut d, &Counter).await,
            Err(CloudError::ResourceTypeNotFound(_))
        ));

        let mut registry = ResourceRegistry::new();
        let mut immutable = thing(None);
        immutable.schema.fields.retain(|f| f.force_new);
        registry.register(immutable).unwrap();
        let mut d = ResourceData::for_update(ResourceRecord::new("thing", "thing-a"), Attributes::new());
        assert!(matches!(
            registry.update("thing", &mut d, &Counter).await,
            Err(CloudError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_register_rejects_updatable_schema_without_update() {
        let mut registry = ResourceRegistry::new();
        assert!(registry.register(thing(None)).is_err());

        registry.register(thing(Some(update))).unwrap();
        assert!(registry.register(thing(Some(update))).is_err());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["thing"]);
    }

    #[tokio::test]
    async fn test_update_drops_undeclared_fields() {
        let registry = registry();
        let record = ResourceRecord::new("thing", "thing-a")
            .with_attribute("name", json!("a"))
            .with_attribute("motto", json!("HI"))
            .with_attribute("size", json!(1));
        let mut d = ResourceData::for_update(record.clone(), attrs(json!({"name": "a"})));

        registry.update("thing", &mut d, &Counter).await.unwrap();

        assert!(d.get("motto").is_none());
        assert!(d.has_change("motto"));
        let updated = d.into_record();
        assert!(!updated.attributes.contains_key("motto"));
        assert_eq!(updated.attributes["size"], json!(1));

        let dropped = ResourceData::for_update(record, attrs(json!({"name": "a"})));
        assert_eq!(
            registry.plan_change("thing", &dropped).unwrap(),
            Change::Update(vec!["motto"])
        );
        let settled = ResourceData::for_update(updated, attrs(json!({"name": "a"})));
        assert_eq!(registry.plan_change("thing", &settled).unwrap(), Change::NoOp);
    }

    #[test]
    fn test_plan_change() {
        let registry = registry();
        let record = ResourceRecord::new("thing", "thing-a")
            .with_attribute("name", json!("a"))
            .with_attribute("motto", json!("HI"))
            .with_attribute("size", json!(1));

        let same = ResourceData::for_update(record.clone(), attrs(json!({"name": "a", "motto": "hi"})));
        assert_eq!(registry.plan_change("thing", &same).unwrap(), Change::NoOp);

        let louder = ResourceData::for_update(record.clone(), attrs(json!({"name": "a", "motto": "yo"})));
        assert_eq!(
            registry.plan_change("thing", &louder).unwrap(),
            Change::Update(vec!["motto"])
        );

        let renamed = ResourceData::for_update(record, attrs(json!({"name": "b", "motto": "hi"})));
        assert_eq!(
            registry.plan_change("thing", &renamed).unwrap(),
            Change::Replace(vec!["name"])
        );

        let fresh = ResourceData::for_create("thing", attrs(json!({"name": "a"})));
        assert_eq!(
            registry.plan_change("thing", &fresh).unwrap(),
            Change::Replace(Vec::new())
        );
    }
}
