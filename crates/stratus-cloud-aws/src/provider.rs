//! Registry of the AWS resource types

use crate::client::AwsClient;
use crate::resources::{elb, internet_gateway, launch_configuration, s3_bucket};
use stratus_cloud::{ResourceRegistry, Result};

/// Provider name (used as the resource type prefix)
pub const PROVIDER_NAME: &str = "aws";

/// Build the registry of every AWS resource type
///
/// Called once at startup; the orchestrator dispatches through the
/// returned registry by type name.
pub fn registry() -> Result<ResourceRegistry<AwsClient>> {
    let mut registry = ResourceRegistry::new();
    registry.register(internet_gateway::resource())?;
    registry.register(s3_bucket::resource())?;
    registry.register(launch_configuration::resource())?;
    registry.register(elb::resource())?;

    tracing::debug!(
        provider = PROVIDER_NAME,
        types = ?registry.names().collect::<Vec<_>>(),
        "Registered resource types"
    );
    Ok(registry)
}
