//! `aws_elb`: classic load balancers

use super::{declares, required_str};
use crate::api::{CreateLoadBalancerRequest, HealthCheck, Listener};
use crate::client::AwsClient;
use crate::refresh::{LoadBalancerProbe, refresh_once};
use futures_util::future::BoxFuture;
use serde_json::Value;
use stratus_cloud::{
    CloudError, FieldKind, FieldSchema, LogicalState, ResourceData, ResourceSchema, ResourceType,
    Result, RetrySpec, retry_delete, string_list,
};

pub const NAME: &str = "aws_elb";

fn single_block(value: &Value) -> std::result::Result<(), String> {
    match value.as_array() {
        Some(items) if items.len() > 1 => Err("at most one block is allowed".to_string()),
        _ => Ok(()),
    }
}

fn listener_schema() -> Vec<FieldSchema> {
    vec![
        FieldSchema::new("instance_port", FieldKind::Int).required(),
        FieldSchema::new("instance_protocol", FieldKind::String).required(),
        FieldSchema::new("lb_port", FieldKind::Int).required(),
        FieldSchema::new("lb_protocol", FieldKind::String).required(),
        FieldSchema::new("ssl_certificate_id", FieldKind::String),
    ]
}

fn health_check_schema() -> Vec<FieldSchema> {
    vec![
        FieldSchema::new("healthy_threshold", FieldKind::Int).required(),
        FieldSchema::new("unhealthy_threshold", FieldKind::Int).required(),
        FieldSchema::new("target", FieldKind::String).required(),
        FieldSchema::new("interval", FieldKind::Int).required(),
        FieldSchema::new("timeout", FieldKind::Int).required(),
    ]
}

pub fn resource() -> ResourceType<AwsClient> {
    ResourceType {
        name: NAME,
        schema: ResourceSchema::new()
            .field(FieldSchema::new("name", FieldKind::String).required().force_new())
            .field(
                FieldSchema::new("availability_zones", FieldKind::StringSet)
                    .required()
                    .force_new(),
            )
            .field(
                FieldSchema::new("listener", FieldKind::List(listener_schema()))
                    .required()
                    .force_new(),
            )
            .field(
                FieldSchema::new("health_check", FieldKind::List(health_check_schema()))
                    .computed()
                    .validate(single_block),
            )
            .field(
                FieldSchema::new("cross_zone_load_balancing", FieldKind::Bool).default_value(false),
            )
            .field(FieldSchema::new("instances", FieldKind::StringSet).computed())
            .field(FieldSchema::new("dns_name", FieldKind::String).computed()),
        create,
        read,
        update: Some(update),
        delete,
    }
}

fn create<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(create_load_balancer(d, client))
}

fn read<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(read_load_balancer(d, client))
}

fn update<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(update_load_balancer(d, client))
}

fn delete<'a>(d: &'a mut ResourceData, client: &'a AwsClient) -> BoxFuture<'a, Result<()>> {
    Box::pin(delete_load_balancer(d, client))
}

fn declared_health_check(d: &ResourceData) -> Result<Option<HealthCheck>> {
    Ok(d
        .get_as::<Vec<HealthCheck>>("health_check")?
        .and_then(|checks| checks.into_iter().next()))
}

async fn create_load_balancer(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let request = CreateLoadBalancerRequest {
        name: required_str(d, "name")?,
        availability_zones: d.get_string_list("availability_zones"),
        listeners: d.get_as::<Vec<Listener>>("listener")?.unwrap_or_default(),
    };

    tracing::debug!("ELB create configuration: {:?}", request);
    let dns_name = client.elb.create_load_balancer(&request).await?;
    d.set_id(request.name);
    d.set("dns_name", dns_name);
    tracing::info!("ELB ID: {}", d.id());

    let instances = d.get_string_list("instances");
    if !instances.is_empty() {
        client.elb.register_instances(d.id(), &instances).await?;
    }
    if let Some(health_check) = declared_health_check(d)? {
        client.elb.configure_health_check(d.id(), &health_check).await?;
    }
    if d.get_bool("cross_zone_load_balancing").unwrap_or(false) {
        client.elb.set_cross_zone_load_balancing(d.id(), true).await?;
    }

    d.set_logical_state(LogicalState::Available);
    Ok(())
}

async fn read_load_balancer(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    let probe = LoadBalancerProbe::new(client.elb.clone(), d.id());
    let Some(lb) = refresh_once(probe).await? else {
        tracing::warn!("ELB {} is gone", d.id());
        d.clear_id();
        return Ok(());
    };
    // The load balancer can vanish between the two describes
    let cross_zone = match client.elb.cross_zone_load_balancing(&lb.name).await {
        Ok(enabled) => enabled,
        Err(err) if err.is_not_found() => {
            tracing::warn!("ELB {} is gone: {}", d.id(), err);
            d.clear_id();
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    d.set("name", lb.name.clone());
    d.set("dns_name", lb.dns_name.clone());
    d.set("availability_zones", lb.availability_zones.clone());
    d.set("listener", serde_json::to_value(&lb.listeners)?);
    d.set("instances", lb.instances.clone());
    d.set(
        "health_check",
        serde_json::to_value(lb.health_check.iter().collect::<Vec<_>>())?,
    );
    d.set("cross_zone_load_balancing", cross_zone);
    d.set_logical_state(LogicalState::Available);
    Ok(())
}

async fn update_load_balancer(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    if declares(d, "instances") && d.has_change("instances") {
        let (old, new) = d.get_change("instances");
        let (old, new) = (string_list(old), string_list(new));
        let add: Vec<String> = new.iter().filter(|i| !old.contains(i)).cloned().collect();
        let remove: Vec<String> = old.iter().filter(|i| !new.contains(i)).cloned().collect();

        if !remove.is_empty() {
            tracing::info!("ELB {} deregistering instances {:?}", d.id(), remove);
            client.elb.deregister_instances(d.id(), &remove).await?;
        }
        if !add.is_empty() {
            tracing::info!("ELB {} registering instances {:?}", d.id(), add);
            client.elb.register_instances(d.id(), &add).await?;
        }
    }

    if declares(d, "health_check") && d.has_change("health_check") {
        if let Some(health_check) = declared_health_check(d)? {
            tracing::info!("ELB {} configuring health check", d.id());
            client.elb.configure_health_check(d.id(), &health_check).await?;
        }
    }

    if d.has_change("cross_zone_load_balancing") {
        let enabled = d.get_bool("cross_zone_load_balancing").unwrap_or(false);
        tracing::info!("ELB {} setting cross-zone load balancing to {}", d.id(), enabled);
        client.elb.set_cross_zone_load_balancing(d.id(), enabled).await?;
    }

    Ok(())
}

async fn delete_load_balancer(d: &mut ResourceData, client: &AwsClient) -> Result<()> {
    tracing::info!("Deleting ELB: {}", d.id());
    let id = d.id().to_string();
    let elb = client.elb.as_ref();
    let name = id.as_str();
    let spec = RetrySpec::new(client.config.timeouts.delete());
    retry_delete(name, &spec, move || async move {
        elb.delete_load_balancer(name).await.map_err(CloudError::from)
    })
    .await?;

    d.clear_id();
    Ok(())
}
