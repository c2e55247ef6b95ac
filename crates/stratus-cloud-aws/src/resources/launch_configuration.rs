//! `aws_launch_configuration`
//!
//! Launch configurations are immutable in AWS: every field forces a new
//! one and the type has no update handler.

use super::{optional_str, required_str};
use crate::api::{BlockDeviceMapping, LaunchConfiguration};
use crate::client::AwsClient;
use crate::refresh::{LaunchConfigurationProbe, refresh_once};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use futures_util::future::BoxFuture;
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::fmt::Write;
use stratus_cloud::{
    CloudError, FieldKind, FieldSchema, LogicalState, ResourceData, ResourceSchema, ResourceType,
    Result, RetryError, RetrySpec, retry, retry_delete,
};

pub const NAME: &str = "aws_launch_configuration";

/// Hex SHA-1 of the user data; state keeps the hash, not the script
fn hash_user_data(value: &Value) -> Value {
    match value.as_str() {
        Some(data) => Value::String(sha1_hex(data)),
        None => Value::String(String::new()),
    }
}

fn sha1_hex(data: &str) -> String {
    let mut hex = String::with_capacity(40);
    for b in Sha1::digest(data.as_bytes()) {
        let _ = write!(hex, "{b:02x}");
    }
    hex
}

fn block_device_schema() -> Vec<FieldSchema> {
    vec![
        FieldSchema::new("device_name", FieldKind::String).required(),
        FieldSchema::new("virtual_name", FieldKind::String),
        FieldSchema::new("snapshot_id", FieldKind::String).computed(),
        FieldSchema::new("volume_type", FieldKind::String).computed(),
        FieldSchema::new("volume_size", FieldKind::Int).computed(),
        FieldSchema::new("delete_on_termination", FieldKind::Bool),
        FieldSchema::new("encrypted", FieldKind::Bool).computed(),
    ]
}

pub fn resource() -> ResourceType<AwsClient> {
    ResourceType {
        name: NAME,
        schema: ResourceSchema::new()
            .field(FieldSchema::new("name", FieldKind::String).required().force_new())
            .field(FieldSchema::new("image_id", FieldKind::String).required().force_new())
            .field(FieldSchema::new("instance_type", FieldKind::String).required().force_new())
            .field(FieldSchema::new("iam_instance_profile", FieldKind::String).force_new())
            .field(FieldSchema::new("key_name", FieldKind::String).computed().force_new())
            .field(
                FieldSchema::new("user_data", FieldKind::String)
                    .force_new()
                    .state_func(hash_user_data),
            )
            .field(FieldSchema::new("security_groups", FieldKind::StringSet).force_new())
            .field(
                FieldSchema::new("associate_public_ip_address", FieldKind::Bool)
                    .force_new()
                    .default_value(false),
            )
            .field(FieldSchema::new("spot_price", FieldKind::String).force_new())
            .field(
                FieldSchema::new("block_device", FieldKind::List(block_device_schema()))
                    .computed()
                    .force_new(),
            ),
        create,
        read,
        update: None,
        delete,
    }
}

fn create<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(create_launch_configuration(d, client))
}

fn read<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(read_launch_configuration(d, client))
}

fn delete<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(delete_launch_configuration(d, client))
}

fn launch_configuration(d: &ResourceData) -> Result<LaunchConfiguration> {
    Ok(LaunchConfiguration {
        name: required_str(d, "name")?,
        image_id: required_str(d, "image_id")?,
        instance_type: required_str(d, "instance_type")?,
        iam_instance_profile: optional_str(d, "iam_instance_profile"),
        key_name: optional_str(d, "key_name"),
        user_data: optional_str(d, "user_data").map(|data| STANDARD.encode(data)),
        security_groups: d.get_string_list("security_groups"),
        associate_public_ip_address: d.get_ok("associate_public_ip_address").and_then(Value::as_bool),
        spot_price: optional_str(d, "spot_price"),
        block_device_mappings: d
            .get_as::<Vec<BlockDeviceMapping>>("block_device")?
            .unwrap_or_default(),
    })
}

async fn create_launch_configuration(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let config = launch_configuration(d)?;

    tracing::debug!("autoscaling create launch configuration: {:?}", config.name);
    client.autoscaling.create_launch_configuration(&config).await?;

    d.set_id(config.name);
    tracing::info!("launch configuration ID: {}", d.id());

    // A new launch configuration can take a while to show up in describes
    let name = d.id().to_string();
    let spec = RetrySpec::new(client.config.timeouts.create_read())
        .with_delays(client.config.poll_interval(), client.config.poll_interval() * 4);
    let found = retry(&name, &spec, || {
        let probe = LaunchConfigurationProbe::new(client.autoscaling.clone(), name.clone());
        let resource_id = name.clone();
        async move {
            match refresh_once(probe).await {
                Ok(Some(config)) => Ok(config),
                Ok(None) => Err(RetryError::retryable(CloudError::NotVisible { resource_id })),
                Err(err @ CloudError::Mismatch { .. }) => Err(RetryError::Retryable(err)),
                Err(err) => Err(RetryError::Fatal(err)),
            }
        }
    })
    .await?;

    apply(d, &found)?;
    Ok(())
}

async fn read_launch_configuration(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let probe = LaunchConfigurationProbe::new(client.autoscaling.clone(), d.id());
    match refresh_once(probe).await? {
        Some(config) => apply(d, &config),
        None => {
            tracing::warn!("Launch configuration {} is gone", d.id());
            d.clear_id();
            Ok(())
        }
    }
}

/// Copy what AWS reports into state; user data is never echoed back
fn apply(d: &mut ResourceData, config: &LaunchConfiguration) -> Result<()> {
    d.set("name", config.name.clone());
    d.set("image_id", config.image_id.clone());
    d.set("instance_type", config.instance_type.clone());
    d.set("key_name", config.key_name.clone().unwrap_or_default());
    d.set("iam_instance_profile", config.iam_instance_profile.clone());
    d.set("spot_price", config.spot_price.clone());
    d.set("security_groups", config.security_groups.clone());
    if let Some(public_ip) = config.associate_public_ip_address {
        d.set("associate_public_ip_address", public_ip);
    }
    d.set("block_device", serde_json::to_value(&config.block_device_mappings)?);
    d.set_logical_state(LogicalState::Available);
    Ok(())
}

async fn delete_launch_configuration(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    tracing::debug!("Launch Configuration destroy: {}", d.id());
    let id = d.id().to_string();
    let autoscaling = client.autoscaling.as_ref();
    let name = id.as_str();
    let spec = RetrySpec::new(client.config.timeouts.delete());
    retry_delete(name, &spec, move || async move {
        autoscaling
            .delete_launch_configuration(name)
            .await
            .map_err(CloudError::from)
    })
    .await?;

    d.clear_id();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCloud;
    use serde_json::json;
    use stratus_cloud::{Attributes, ResourceRecord};

    fn declared() -> Attributes {
        serde_json::from_value(json!({
            "name": "web",
            "image_id": "ami-21f78e11",
            "instance_type": "t1.micro",
            "user_data": "#!/bin/sh\necho hello\n",
            "security_groups": ["sg-1"],
            "block_device": [{"device_name": "/dev/sdb", "volume_size": 8}]
        }))
        .unwrap()
    }

    #[test]
    fn test_hash_user_data() {
        assert_eq!(
            hash_user_data(&json!("foo")),
            json!("0beec7b5ea3f0fdbc95d0dd47f3c5bc275da8a33")
        );
        assert_eq!(hash_user_data(&json!(null)), json!(""));
    }

    #[tokio::test]
    async fn test_create_encodes_user_data() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, declared());

        create_launch_configuration(&mut d, &client).await.unwrap();

        let stored = cloud.launch_configuration("web").unwrap();
        assert_eq!(
            stored.user_data.as_deref(),
            Some(STANDARD.encode("#!/bin/sh\necho hello\n").as_str())
        );
        assert_eq!(stored.block_device_mappings[0].volume_size, Some(8));
        assert!(stored.block_device_mappings[0].delete_on_termination);
        assert_eq!(d.id(), "web");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_waits_for_new_configuration_to_appear() {
        let cloud = MemoryCloud::new();
        cloud.set_consistency_lag(3);
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, declared());

        create_launch_configuration(&mut d, &client).await.unwrap();

        assert_eq!(cloud.count("describe_launch_configurations"), 4);
        assert_eq!(d.logical_state(), LogicalState::Available);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_gives_up_after_read_budget() {
        let cloud = MemoryCloud::new();
        cloud.set_consistency_lag(u32::MAX);
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, declared());

        let err = create_launch_configuration(&mut d, &client).await.unwrap_err();
        assert!(matches!(err, CloudError::RetryTimeout { .. }));
    }

    #[tokio::test]
    async fn test_read_missing_configuration_clears_id() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::from_record(ResourceRecord::new(NAME, "web"));

        read_launch_configuration(&mut d, &client).await.unwrap();
        assert_eq!(d.id(), "");
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_while_in_use() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, declared());
        create_launch_configuration(&mut d, &client).await.unwrap();
        cloud.fail_next("delete_launch_configuration", "ResourceInUse");

        let mut d = ResourceData::from_record(d.into_record());
        delete_launch_configuration(&mut d, &client).await.unwrap();

        assert_eq!(cloud.count("delete_launch_configuration"), 2);
        assert!(cloud.launch_configuration("web").is_none());
    }
}
