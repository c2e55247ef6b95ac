//! Client context shared by all AWS handlers

use crate::api::{AutoscalingApi, Ec2Api, ElbApi, S3Api};
use crate::config::AwsConfig;
use std::fmt;
use std::sync::Arc;

/// Configuration plus one API client per service family
///
/// Cloning is cheap; clones share the underlying API clients, so one
/// `AwsClient` can serve concurrent handler invocations for distinct ids.
#[derive(Clone)]
pub struct AwsClient {
    pub config: AwsConfig,
    pub ec2: Arc<dyn Ec2Api>,
    pub s3: Arc<dyn S3Api>,
    pub autoscaling: Arc<dyn AutoscalingApi>,
    pub elb: Arc<dyn ElbApi>,
}

impl AwsClient {
    pub fn new(
        config: AwsConfig,
        ec2: Arc<dyn Ec2Api>,
        s3: Arc<dyn S3Api>,
        autoscaling: Arc<dyn AutoscalingApi>,
        elb: Arc<dyn ElbApi>,
    ) -> Self {
        Self {
            config,
            ec2,
            s3,
            autoscaling,
            elb,
        }
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }
}

impl fmt::Debug for AwsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::MemoryCloud;

    #[test]
    fn test_region_and_debug_follow_config() {
        let client = MemoryCloud::with_region("eu-west-1").client();
        assert_eq!(client.region(), "eu-west-1");
        assert!(format!("{client:?}").contains("eu-west-1"));
    }
}
