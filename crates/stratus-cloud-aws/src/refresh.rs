//! Refresh probes for AWS objects
//!
//! Every probe treats a not-found answer as "not visible yet": AWS describe
//! calls lag behind the mutating calls, so absence right after a create or
//! attach is expected. Only the single-shot reads in the handlers turn that
//! answer into a cleared id.

use crate::api::{
    AutoscalingApi, Ec2Api, ElbApi, InternetGateway, LaunchConfiguration, LoadBalancerDescription,
    S3Api,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use stratus_cloud::{ApiError, CloudError, Observed, RefreshProbe, Result};
use tokio::time::Instant;

/// State reported by single-object probes once the object is visible
pub const AVAILABLE: &str = "available";

/// State of a gateway without attachments
pub const DETACHED: &str = "detached";

/// Map a describe failure to "not visible" or a real error
fn absent_or_error<T>(resource_id: &str, err: ApiError) -> Result<Option<T>> {
    if err.is_not_found() {
        tracing::debug!(resource = %resource_id, code = %err.code, "Not visible yet");
        Ok(None)
    } else {
        tracing::error!(resource = %resource_id, error = %err, "Refresh failed");
        Err(err.into())
    }
}

async fn describe_gateway(ec2: &dyn Ec2Api, id: &str) -> Result<Option<InternetGateway>> {
    match ec2.describe_internet_gateways(&[id.to_string()]).await {
        Ok(gateways) => Ok(gateways.into_iter().next()),
        Err(err) => absent_or_error(id, err),
    }
}

/// Watches an internet gateway; a visible gateway is always `available`
pub struct InternetGatewayProbe {
    ec2: Arc<dyn Ec2Api>,
    id: String,
}

impl InternetGatewayProbe {
    pub fn new(ec2: Arc<dyn Ec2Api>, id: impl Into<String>) -> Self {
        Self { ec2, id: id.into() }
    }
}

#[async_trait]
impl RefreshProbe for InternetGatewayProbe {
    type Object = InternetGateway;

    fn resource_id(&self) -> &str {
        &self.id
    }

    async fn refresh(&mut self) -> Result<Option<Observed<InternetGateway>>> {
        let gateway = describe_gateway(self.ec2.as_ref(), &self.id).await?;
        Ok(gateway.map(|g| Observed::new(g, AVAILABLE)))
    }
}

/// Watches the attachment of an internet gateway
///
/// The state is the status of the first attachment, or `detached` when
/// there is none. Once `grace` has passed since the first call the probe
/// answers with `expected` regardless of what EC2 reports; EC2 keeps
/// reporting intermediate states for a while after the transition is done.
/// One instance belongs to exactly one polling session.
pub struct AttachmentProbe {
    ec2: Arc<dyn Ec2Api>,
    id: String,
    expected: String,
    grace: Duration,
    started: Option<Instant>,
}

impl AttachmentProbe {
    pub fn new(
        ec2: Arc<dyn Ec2Api>,
        id: impl Into<String>,
        expected: impl Into<String>,
        grace: Duration,
    ) -> Self {
        Self {
            ec2,
            id: id.into(),
            expected: expected.into(),
            grace,
            started: None,
        }
    }

    fn attachment_state(gateway: &InternetGateway) -> String {
        gateway
            .attachments
            .first()
            .map(|a| a.state.clone())
            .unwrap_or_else(|| DETACHED.to_string())
    }
}

#[async_trait]
impl RefreshProbe for AttachmentProbe {
    type Object = InternetGateway;

    fn resource_id(&self) -> &str {
        &self.id
    }

    async fn refresh(&mut self) -> Result<Option<Observed<InternetGateway>>> {
        let started = *self.started.get_or_insert_with(Instant::now);

        let Some(gateway) = describe_gateway(self.ec2.as_ref(), &self.id).await? else {
            return Ok(None);
        };

        if started.elapsed() > self.grace {
            tracing::debug!(
                resource = %self.id,
                reported = %Self::attachment_state(&gateway),
                expected = %self.expected,
                "Grace period over, assuming expected attachment state"
            );
            let expected = self.expected.clone();
            return Ok(Some(Observed::new(gateway, expected)));
        }

        let state = Self::attachment_state(&gateway);
        Ok(Some(Observed::new(gateway, state)))
    }
}

/// Watches a classic load balancer by name
pub struct LoadBalancerProbe {
    elb: Arc<dyn ElbApi>,
    name: String,
}

impl LoadBalancerProbe {
    pub fn new(elb: Arc<dyn ElbApi>, name: impl Into<String>) -> Self {
        Self {
            elb,
            name: name.into(),
        }
    }
}

#[async_trait]
impl RefreshProbe for LoadBalancerProbe {
    type Object = LoadBalancerDescription;

    fn resource_id(&self) -> &str {
        &self.name
    }

    async fn refresh(&mut self) -> Result<Option<Observed<LoadBalancerDescription>>> {
        match self.elb.describe_load_balancers(&[self.name.clone()]).await {
            Ok(found) => Ok(found
                .into_iter()
                .next()
                .map(|lb| Observed::new(lb, AVAILABLE))),
            Err(err) => absent_or_error(&self.name, err),
        }
    }
}

/// Watches a launch configuration by name
///
/// Fails with [`CloudError::Mismatch`] when the answer describes another
/// launch configuration.
pub struct LaunchConfigurationProbe {
    autoscaling: Arc<dyn AutoscalingApi>,
    name: String,
}

impl LaunchConfigurationProbe {
    pub fn new(autoscaling: Arc<dyn AutoscalingApi>, name: impl Into<String>) -> Self {
        Self {
            autoscaling,
            name: name.into(),
        }
    }
}

#[async_trait]
impl RefreshProbe for LaunchConfigurationProbe {
    type Object = LaunchConfiguration;

    fn resource_id(&self) -> &str {
        &self.name
    }

    async fn refresh(&mut self) -> Result<Option<Observed<LaunchConfiguration>>> {
        let found = match self
            .autoscaling
            .describe_launch_configurations(&[self.name.clone()])
            .await
        {
            Ok(found) => found,
            Err(err) => return absent_or_error(&self.name, err),
        };

        let Some(config) = found.into_iter().next() else {
            return Ok(None);
        };
        if config.name != self.name {
            return Err(CloudError::Mismatch {
                resource_id: self.name.clone(),
                found: config.name,
            });
        }
        Ok(Some(Observed::new(config, AVAILABLE)))
    }
}

/// Watches an S3 bucket through HeadBucket
pub struct BucketProbe {
    s3: Arc<dyn S3Api>,
    bucket: String,
}

impl BucketProbe {
    pub fn new(s3: Arc<dyn S3Api>, bucket: impl Into<String>) -> Self {
        Self {
            s3,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl RefreshProbe for BucketProbe {
    type Object = ();

    fn resource_id(&self) -> &str {
        &self.bucket
    }

    async fn refresh(&mut self) -> Result<Option<Observed<()>>> {
        match self.s3.head_bucket(&self.bucket).await {
            Ok(()) => Ok(Some(Observed::new((), AVAILABLE))),
            Err(err) => absent_or_error(&self.bucket, err),
        }
    }
}

/// Run a probe exactly once; reads never poll
pub async fn refresh_once<P: RefreshProbe>(mut probe: P) -> Result<Option<P::Object>> {
    let observed = probe.refresh().await?;
    tracing::debug!(
        resource = %probe.resource_id(),
        state = observed.as_ref().map(|o| o.state.as_str()).unwrap_or("absent"),
        "Refreshed"
    );
    Ok(observed.map(|o| o.object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Attachment;
    use crate::testing::MemoryCloud;

    fn gateway_with(state: &str) -> InternetGateway {
        InternetGateway {
            id: "igw-1".to_string(),
            attachments: vec![Attachment {
                vpc_id: "vpc-1".to_string(),
                state: state.to_string(),
            }],
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_gateway_probe_not_found_is_not_visible() {
        let cloud = MemoryCloud::new();
        let mut probe = InternetGatewayProbe::new(cloud.clone(), "igw-missing");
        assert!(probe.refresh().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_gateway_probe_propagates_other_errors() {
        let cloud = MemoryCloud::new();
        cloud.fail_next("describe_internet_gateways", "UnauthorizedOperation");
        let mut probe = InternetGatewayProbe::new(cloud.clone(), "igw-1");
        let err = probe.refresh().await.unwrap_err();
        assert_eq!(err.api_error().map(|e| e.code.as_str()), Some("UnauthorizedOperation"));
    }

    #[tokio::test]
    async fn test_attachment_probe_reports_attachment_state() {
        let cloud = MemoryCloud::new();
        cloud.insert_gateway(gateway_with("attaching"));
        let mut probe =
            AttachmentProbe::new(cloud.clone(), "igw-1", AVAILABLE, Duration::from_secs(10));

        let observed = probe.refresh().await.unwrap().unwrap();
        assert_eq!(observed.state, "attaching");

        cloud.insert_gateway(InternetGateway {
            attachments: Vec::new(),
            ..gateway_with("attaching")
        });
        let observed = probe.refresh().await.unwrap().unwrap();
        assert_eq!(observed.state, DETACHED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachment_probe_forces_expected_state_after_grace() {
        let cloud = MemoryCloud::new();
        cloud.insert_gateway(gateway_with("attaching"));
        let mut probe =
            AttachmentProbe::new(cloud.clone(), "igw-1", AVAILABLE, Duration::from_secs(10));

        assert_eq!(probe.refresh().await.unwrap().unwrap().state, "attaching");

        tokio::time::advance(Duration::from_secs(11)).await;
        let observed = probe.refresh().await.unwrap().unwrap();
        assert_eq!(observed.state, AVAILABLE);
        assert_eq!(observed.object.attachments[0].state, "attaching");
    }

    #[tokio::test(start_paused = true)]
    async fn test_attachment_probe_sessions_are_independent() {
        let cloud = MemoryCloud::new();
        cloud.insert_gateway(gateway_with("detaching"));

        let mut first = AttachmentProbe::new(cloud.clone(), "igw-1", DETACHED, Duration::from_secs(10));
        first.refresh().await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        let mut second =
            AttachmentProbe::new(cloud.clone(), "igw-1", DETACHED, Duration::from_secs(10));
        assert_eq!(second.refresh().await.unwrap().unwrap().state, "detaching");
        assert_eq!(first.refresh().await.unwrap().unwrap().state, DETACHED);
    }

    #[tokio::test]
    async fn test_launch_configuration_probe_detects_mismatch() {
        let cloud = MemoryCloud::new();
        cloud.answer_launch_configurations_with("other");
        let probe = LaunchConfigurationProbe::new(cloud.clone(), "web");
        let err = refresh_once(probe).await.unwrap_err();
        assert!(matches!(err, CloudError::Mismatch { found, .. } if found == "other"));
    }

    #[tokio::test]
    async fn test_bucket_probe() {
        let cloud = MemoryCloud::new();
        assert!(refresh_once(BucketProbe::new(cloud.clone(), "logs")).await.unwrap().is_none());

        cloud.fail_next("head_bucket", "AccessDenied");
        assert!(refresh_once(BucketProbe::new(cloud.clone(), "logs")).await.is_err());
    }

    #[tokio::test]
    async fn test_load_balancer_probe_not_found() {
        let cloud = MemoryCloud::new();
        let found = refresh_once(LoadBalancerProbe::new(cloud.clone(), "web")).await.unwrap();
        assert!(found.is_none());
    }
}
