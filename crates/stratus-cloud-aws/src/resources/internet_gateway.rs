//! `aws_internet_gateway`

use super::tags;
use crate::client::AwsClient;
use crate::refresh::{AVAILABLE, AttachmentProbe, DETACHED, InternetGatewayProbe, refresh_once};
use futures_util::future::BoxFuture;
use stratus_cloud::{
    CloudError, FieldKind, FieldSchema, LogicalState, ResourceData, ResourceSchema,
    ResourceType, Result, RetrySpec, WaitSpec, retry_delete, wait_for_state,
};

pub const NAME: &str = "aws_internet_gateway";

// EC2 documents attached/attaching/detached/detaching, but a finished
// attachment is reported as "available"
const ATTACH_PENDING: [&str; 2] = ["detached", "attaching"];
const DETACH_PENDING: [&str; 3] = ["attached", "detaching", "available"];

pub fn resource() -> ResourceType<AwsClient> {
    ResourceType {
        name: NAME,
        schema: ResourceSchema::new()
            .field(FieldSchema::new("vpc_id", FieldKind::String))
            .field(tags::schema()),
        create,
        read,
        update: Some(update),
        delete,
    }
}

fn create<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(create_internet_gateway(d, client))
}

fn read<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(read_internet_gateway(d, client))
}

fn update<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(update_internet_gateway(d, client))
}

fn delete<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(delete_internet_gateway(d, client))
}

async fn create_internet_gateway(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    tracing::debug!("Creating internet gateway");
    let gateway = client.ec2.create_internet_gateway().await?;
    d.set_id(gateway.id);
    tracing::info!("InternetGateway ID: {}", d.id());

    tags::set_tags(client.ec2.as_ref(), d).await?;

    attach(d, client).await
}

async fn read_internet_gateway(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let probe = InternetGatewayProbe::new(client.ec2.clone(), d.id());
    let Some(gateway) = refresh_once(probe).await? else {
        tracing::warn!("Internet gateway {} is gone", d.id());
        d.clear_id();
        return Ok(());
    };

    match gateway.attachments.first() {
        Some(attachment) => {
            d.set("vpc_id", attachment.vpc_id.clone());
            d.set_logical_state(LogicalState::parse(&attachment.state));
        }
        None => {
            d.set("vpc_id", "");
            d.set_logical_state(LogicalState::Detached);
        }
    }
    d.set(tags::TAGS, tags::tags_value(&gateway.tags));
    Ok(())
}

async fn update_internet_gateway(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    if d.has_change("vpc_id") {
        detach(d, client).await?;
        attach(d, client).await?;
    }

    tags::set_tags(client.ec2.as_ref(), d).await
}

async fn delete_internet_gateway(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    detach(d, client).await?;

    tracing::info!("Deleting Internet Gateway: {}", d.id());
    let id = d.id().to_string();
    let ec2 = client.ec2.as_ref();
    let gateway_id = id.as_str();
    let spec = RetrySpec::new(client.config.timeouts.delete());
    retry_delete(gateway_id, &spec, move || async move {
        ec2.delete_internet_gateway(gateway_id)
            .await
            .map_err(CloudError::from)
    })
    .await?;

    d.clear_id();
    Ok(())
}

/// Attach to the declared VPC and wait until the attachment is available
async fn attach(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let vpc_id = d.get_str("vpc_id").unwrap_or_default().to_string();
    if vpc_id.is_empty() {
        tracing::debug!("Not attaching Internet Gateway '{}' as no VPC ID is set", d.id());
        d.set_logical_state(LogicalState::Detached);
        return Ok(());
    }

    tracing::info!("Attaching Internet Gateway '{}' to VPC '{}'", d.id(), vpc_id);
    client.ec2.attach_internet_gateway(d.id(), &vpc_id).await?;

    tracing::debug!("Waiting for internet gateway ({}) to attach", d.id());
    let timeouts = &client.config.timeouts;
    let probe = AttachmentProbe::new(client.ec2.clone(), d.id(), AVAILABLE, timeouts.attach_grace());
    let spec = WaitSpec::new(probe, AVAILABLE, timeouts.attach())
        .with_pending(ATTACH_PENDING)
        .with_poll_interval(client.config.poll_interval());
    wait_for_state(spec).await?;

    d.set_logical_state(LogicalState::Available);
    Ok(())
}

/// Detach from the previously recorded VPC and wait until detached
///
/// A gateway that is already gone or not attached needs no waiting.
async fn detach(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let vpc_id = d.old_str("vpc_id").to_string();
    if vpc_id.is_empty() {
        tracing::debug!("Not detaching Internet Gateway '{}' as no VPC ID is set", d.id());
        return Ok(());
    }

    tracing::info!("Detaching Internet Gateway '{}' from VPC '{}'", d.id(), vpc_id);
    match client.ec2.detach_internet_gateway(d.id(), &vpc_id).await {
        Ok(()) => {}
        Err(err) if err.is_not_found() || err.is_not_attached() => {
            tracing::debug!("Internet gateway {} already detached: {}", d.id(), err);
            d.set_logical_state(LogicalState::Detached);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    }

    tracing::debug!("Waiting for internet gateway ({}) to detach", d.id());
    let timeouts = &client.config.timeouts;
    let probe = AttachmentProbe::new(client.ec2.clone(), d.id(), DETACHED, timeouts.attach_grace());
    let spec = WaitSpec::new(probe, DETACHED, timeouts.detach())
        .with_pending(DETACH_PENDING)
        .with_poll_interval(client.config.poll_interval());
    wait_for_state(spec).await?;

    d.set_logical_state(LogicalState::Detached);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryCloud;
    use serde_json::json;
    use stratus_cloud::{Attributes, ResourceRecord};

    fn attrs(value: serde_json::Value) -> Attributes {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_tags_then_attaches() {
        let cloud = MemoryCloud::new();
        cloud.set_transition_describes(2);
        let client = cloud.client();
        let mut d = ResourceData::for_create(
            NAME,
            attrs(json!({"vpc_id": "vpc-1", "tags": {"Name": "main"}})),
        );

        create_internet_gateway(&mut d, &client).await.unwrap();

        let gateway = cloud.gateway(d.id()).unwrap();
        assert_eq!(gateway.attachments[0].vpc_id, "vpc-1");
        assert_eq!(gateway.attachments[0].state, "available");
        assert_eq!(d.logical_state(), LogicalState::Available);

        let mutations = cloud.mutations();
        assert_eq!(mutations.len(), 3);
        assert!(mutations[1].starts_with("create_tags"));
        assert!(mutations[2].starts_with("attach_internet_gateway"));
    }

    #[tokio::test]
    async fn test_create_without_vpc_does_not_attach() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, Attributes::new());

        create_internet_gateway(&mut d, &client).await.unwrap();

        assert_eq!(cloud.count("attach_internet_gateway"), 0);
        assert_eq!(d.logical_state(), LogicalState::Detached);
    }

    #[tokio::test]
    async fn test_read_copies_remote_attributes() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(
            NAME,
            attrs(json!({"vpc_id": "vpc-1", "tags": {"Name": "main"}})),
        );
        create_internet_gateway(&mut d, &client).await.unwrap();
        let id = d.id().to_string();

        // Local drift is overwritten by what EC2 reports
        let record = ResourceRecord::new(NAME, id)
            .with_attribute("vpc_id", json!("vpc-stale"))
            .with_attribute("tags", json!({}));
        let mut d = ResourceData::from_record(record);
        read_internet_gateway(&mut d, &client).await.unwrap();

        let record = d.into_record();
        assert_eq!(record.attributes["vpc_id"], json!("vpc-1"));
        assert_eq!(record.attributes["tags"], json!({"Name": "main"}));
        assert_eq!(record.logical_state, LogicalState::Available);
    }

    #[tokio::test]
    async fn test_detach_tolerates_not_attached() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, Attributes::new());
        create_internet_gateway(&mut d, &client).await.unwrap();

        // State claims an attachment EC2 does not know about
        let record = ResourceRecord::new(NAME, d.id()).with_attribute("vpc_id", json!("vpc-1"));
        let mut d = ResourceData::from_record(record);
        delete_internet_gateway(&mut d, &client).await.unwrap();

        assert_eq!(d.id(), "");
        assert_eq!(cloud.count("describe_internet_gateways"), 0);
    }

    #[tokio::test]
    async fn test_detach_of_missing_gateway_returns_at_once() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let record = ResourceRecord::new(NAME, "igw-gone").with_attribute("vpc_id", json!("vpc-1"));
        let mut d = ResourceData::from_record(record);

        detach(&mut d, &client).await.unwrap();

        assert_eq!(d.logical_state(), LogicalState::Detached);
        assert_eq!(cloud.calls(), vec!["detach_internet_gateway igw-gone vpc-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_retries_dependency_violation() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, Attributes::new());
        create_internet_gateway(&mut d, &client).await.unwrap();
        cloud.fail_times("delete_internet_gateway", "DependencyViolation", 2);

        let id = d.id().to_string();
        let mut d = ResourceData::from_record(d.into_record());
        delete_internet_gateway(&mut d, &client).await.unwrap();

        assert_eq!(cloud.count("delete_internet_gateway"), 3);
        assert!(cloud.gateway(&id).is_none());
    }

    #[tokio::test]
    async fn test_delete_fails_on_other_errors() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, Attributes::new());
        create_internet_gateway(&mut d, &client).await.unwrap();
        cloud.fail_next("delete_internet_gateway", "UnauthorizedOperation");

        let mut d = ResourceData::from_record(d.into_record());
        let err = delete_internet_gateway(&mut d, &client).await.unwrap_err();

        assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("UnauthorizedOperation"));
        assert_eq!(cloud.count("delete_internet_gateway"), 1);
        assert!(!d.id().is_empty());
    }
}
