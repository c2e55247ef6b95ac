//! Stratus Cloud AWS
//!
//! AWS resource handlers for the Stratus convergence engine.
//!
//! # Resource types
//!
//! - `aws_internet_gateway`: gateway plus its VPC attachment and tags
//! - `aws_s3_bucket`: bucket with canned ACL, pinned to the client region
//! - `aws_launch_configuration`: immutable Auto Scaling launch configuration
//! - `aws_elb`: classic load balancer with instances and health check
//!
//! Handlers talk to AWS only through the capability traits in [`api`]. The
//! `sdk` feature provides adapters over the official AWS SDK; the `testing`
//! feature provides an in-memory cloud.
//!
//! # Example
//!
//! ```ignore
//! use stratus_cloud::ResourceData;
//! use stratus_cloud_aws::{AwsClient, AwsConfig, registry};
//!
//! let client = AwsClient::from_sdk(AwsConfig::from_env()?).await?;
//! let registry = registry()?;
//! let mut data = ResourceData::for_create("aws_internet_gateway", declared);
//! registry.create("aws_internet_gateway", &mut data, &client).await?;
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod provider;
pub mod refresh;
pub mod resources;
#[cfg(feature = "sdk")]
pub mod sdk;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-exports
pub use client::AwsClient;
pub use config::{AwsConfig, DEFAULT_REGION, POLL_INTERVAL_ENV, Timeouts};
pub use error::{ConfigError, ErrorCode, Service, api_error};
pub use provider::{PROVIDER_NAME, registry};
pub use refresh::{
    AttachmentProbe, BucketProbe, InternetGatewayProbe, LaunchConfigurationProbe,
    LoadBalancerProbe, refresh_once,
};
