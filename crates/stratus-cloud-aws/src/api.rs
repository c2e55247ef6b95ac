//! Remote API capability consumed by the handlers
//!
//! Each AWS service family is one async trait. Handlers only ever see these
//! traits, so the in-memory cloud and the SDK adapter are interchangeable.
//! Every call fails with a classified [`ApiError`] (see [`crate::error`]).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratus_cloud::ApiError;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ============================================================================
// EC2
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Link between an internet gateway and a VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub vpc_id: String,
    /// Raw state label reported by EC2 (`attaching`, `available`, ...)
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternetGateway {
    pub id: String,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<Tag>,
}

#[async_trait]
pub trait Ec2Api: Send + Sync {
    async fn create_internet_gateway(&self) -> ApiResult<InternetGateway>;

    /// Describe gateways by id; an unknown id fails with
    /// `InvalidInternetGatewayID.NotFound`
    async fn describe_internet_gateways(&self, ids: &[String]) -> ApiResult<Vec<InternetGateway>>;

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ApiResult<()>;

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ApiResult<()>;

    async fn delete_internet_gateway(&self, gateway_id: &str) -> ApiResult<()>;

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> ApiResult<()>;

    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> ApiResult<()>;
}

// ============================================================================
// S3
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBucketRequest {
    pub bucket: String,
    pub acl: String,
    /// Region the bucket is pinned to; `None` for the default region
    pub location_constraint: Option<String>,
}

#[async_trait]
pub trait S3Api: Send + Sync {
    async fn create_bucket(&self, request: &CreateBucketRequest) -> ApiResult<()>;

    /// Succeeds when the bucket exists and is reachable
    async fn head_bucket(&self, bucket: &str) -> ApiResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> ApiResult<()>;
}

// ============================================================================
// Auto Scaling
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDeviceMapping {
    pub device_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size: Option<i64>,
    #[serde(default = "default_delete_on_termination")]
    pub delete_on_termination: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted: Option<bool>,
}

fn default_delete_on_termination() -> bool {
    true
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchConfiguration {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub iam_instance_profile: Option<String>,
    pub key_name: Option<String>,
    /// Base64 encoded
    pub user_data: Option<String>,
    pub security_groups: Vec<String>,
    pub associate_public_ip_address: Option<bool>,
    pub spot_price: Option<String>,
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

#[async_trait]
pub trait AutoscalingApi: Send + Sync {
    async fn create_launch_configuration(&self, config: &LaunchConfiguration) -> ApiResult<()>;

    /// Unknown names are left out of the answer rather than failing
    async fn describe_launch_configurations(
        &self,
        names: &[String],
    ) -> ApiResult<Vec<LaunchConfiguration>>;

    async fn delete_launch_configuration(&self, name: &str) -> ApiResult<()>;
}

// ============================================================================
// Elastic Load Balancing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub instance_port: i64,
    pub instance_protocol: String,
    pub lb_port: i64,
    pub lb_protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssl_certificate_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub healthy_threshold: i64,
    pub unhealthy_threshold: i64,
    pub target: String,
    pub interval: i64,
    pub timeout: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateLoadBalancerRequest {
    pub name: String,
    pub availability_zones: Vec<String>,
    pub listeners: Vec<Listener>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadBalancerDescription {
    pub name: String,
    pub dns_name: String,
    pub availability_zones: Vec<String>,
    pub listeners: Vec<Listener>,
    pub health_check: Option<HealthCheck>,
    pub instances: Vec<String>,
}

#[async_trait]
pub trait ElbApi: Send + Sync {
    /// Returns the DNS name of the new load balancer
    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest) -> ApiResult<String>;

    /// An unknown name fails with `LoadBalancerNotFound`
    async fn describe_load_balancers(
        &self,
        names: &[String],
    ) -> ApiResult<Vec<LoadBalancerDescription>>;

    async fn delete_load_balancer(&self, name: &str) -> ApiResult<()>;

    async fn register_instances(&self, name: &str, instances: &[String]) -> ApiResult<()>;

    async fn deregister_instances(&self, name: &str, instances: &[String]) -> ApiResult<()>;

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> ApiResult<()>;

    async fn cross_zone_load_balancing(&self, name: &str) -> ApiResult<bool>;

    async fn set_cross_zone_load_balancing(&self, name: &str, enabled: bool) -> ApiResult<()>;
}
