use serde_json::{Value, json};
use stratus_cloud::{Attributes, ResourceData, ResourceRecord, ResourceRegistry};
use stratus_cloud_aws::AwsClient;

/// Route handler logs to the test output; `RUST_LOG=debug` shows the polling
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn attrs(value: Value) -> Attributes {
    serde_json::from_value(value).unwrap()
}

/// A valid declaration for every registered resource type
pub fn declarations() -> Vec<(&'static str, Attributes)> {
    vec![
        (
            "aws_internet_gateway",
            attrs(json!({"vpc_id": "vpc-1", "tags": {"Name": "main"}})),
        ),
        ("aws_s3_bucket", attrs(json!({"bucket": "x", "acl": "private"}))),
        (
            "aws_launch_configuration",
            attrs(json!({
                "name": "web",
                "image_id": "ami-21f78e11",
                "instance_type": "t1.micro",
                "user_data": "foo"
            })),
        ),
        (
            "aws_elb",
            attrs(json!({
                "name": "front",
                "availability_zones": ["us-east-1a"],
                "listener": [{
                    "instance_port": 8000,
                    "instance_protocol": "http",
                    "lb_port": 80,
                    "lb_protocol": "http"
                }]
            })),
        ),
    ]
}

/// Create through the registry and return the persisted record
pub async fn create(
    registry: &ResourceRegistry<AwsClient>,
    client: &AwsClient,
    resource_type: &str,
    declared: Attributes,
) -> ResourceRecord {
    let mut d = ResourceData::for_create(resource_type, declared);
    registry.create(resource_type, &mut d, client).await.unwrap();
    assert!(!d.id().is_empty(), "{resource_type} has no id after create");
    d.into_record()
}
