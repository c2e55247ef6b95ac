//! `aws_s3_bucket`

use super::required_str;
use crate::api::CreateBucketRequest;
use crate::client::AwsClient;
use crate::refresh::{BucketProbe, refresh_once};
use futures_util::future::BoxFuture;
use serde_json::Value;
use stratus_cloud::{
    CloudError, FieldKind, FieldSchema, LogicalState, ResourceData, ResourceSchema, ResourceType,
    Result, RetrySpec, retry_delete,
};

pub const NAME: &str = "aws_s3_bucket";

fn valid_bucket_name(value: &Value) -> std::result::Result<(), String> {
    let name = value.as_str().unwrap_or_default();
    if name.is_empty() || name.len() > 63 {
        return Err("bucket names must be 1 to 63 characters long".to_string());
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    {
        return Err("only lowercase letters, digits, '-' and '.' are allowed".to_string());
    }
    Ok(())
}

/// Every field forces a new bucket, so there is no update handler
pub fn resource() -> ResourceType<AwsClient> {
    ResourceType {
        name: NAME,
        schema: ResourceSchema::new()
            .field(
                FieldSchema::new("bucket", FieldKind::String)
                    .required()
                    .force_new()
                    .validate(valid_bucket_name),
            )
            .field(
                FieldSchema::new("acl", FieldKind::String)
                    .force_new()
                    .default_value("private"),
            ),
        create,
        read,
        update: None,
        delete,
    }
}

fn create<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(create_bucket(d, client))
}

fn read<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(read_bucket(d, client))
}

fn delete<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(delete_bucket(d, client))
}

async fn create_bucket(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let request = CreateBucketRequest {
        bucket: required_str(d, "bucket")?,
        acl: d.get_str("acl").unwrap_or("private").to_string(),
        // us-east-1 rejects an explicit constraint
        location_constraint: client.config.location_constraint(),
    };

    tracing::debug!(
        "S3 bucket create: {}, ACL: {}, region: {}",
        request.bucket,
        request.acl,
        client.region()
    );
    client.s3.create_bucket(&request).await?;

    d.set_id(request.bucket);
    d.set_logical_state(LogicalState::Available);
    Ok(())
}

async fn read_bucket(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let probe = BucketProbe::new(client.s3.clone(), d.id());
    if refresh_once(probe).await?.is_none() {
        tracing::warn!("S3 bucket {} is gone", d.id());
        d.clear_id();
        return Ok(());
    }

    let bucket = d.id().to_string();
    d.set("bucket", bucket);
    d.set_logical_state(LogicalState::Available);
    Ok(())
}

async fn delete_bucket(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    tracing::debug!("S3 Delete Bucket: {}", d.id());
    let bucket = d.id().to_string();
    let s3 = client.s3.as_ref();
    let name = bucket.as_str();
    let spec = RetrySpec::new(client.config.timeouts.delete());
    retry_delete(name, &spec, move || async move {
        s3.delete_bucket(name).await.map_err(CloudError::from)
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

    fn declared(bucket: &str) -> Attributes {
        serde_json::from_value(json!({"bucket": bucket, "acl": "private"})).unwrap()
    }

    #[test]
    fn test_bucket_name_validation() {
        assert!(valid_bucket_name(&json!("logs-2024.example")).is_ok());
        assert!(valid_bucket_name(&json!("")).is_err());
        assert!(valid_bucket_name(&json!("Logs")).is_err());
    }

    #[tokio::test]
    async fn test_create_in_default_region_omits_location_constraint() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, declared("logs"));

        create_bucket(&mut d, &client).await.unwrap();

        assert_eq!(d.id(), "logs");
        assert_eq!(cloud.bucket("logs").unwrap().location_constraint, None);
    }

    #[tokio::test]
    async fn test_read_clears_id_of_missing_bucket() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::from_record(ResourceRecord::new(NAME, "logs"));

        read_bucket(&mut d, &client).await.unwrap();
        assert_eq!(d.id(), "");
    }

    #[tokio::test]
    async fn test_delete_non_empty_bucket_is_fatal() {
        let cloud = MemoryCloud::new();
        let client = cloud.client();
        let mut d = ResourceData::for_create(NAME, declared("logs"));
        create_bucket(&mut d, &client).await.unwrap();
        cloud.fail_next("delete_bucket", "BucketNotEmpty");

        let mut d = ResourceData::from_record(d.into_record());
        let err = delete_bucket(&mut d, &client).await.unwrap_err();
        assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("BucketNotEmpty"));
        assert_eq!(d.id(), "logs");
    }
}
