//! API adapters over the official AWS SDK
//!
//! Enabled with the `sdk` feature. Every SDK failure is reduced to its
//! error code via `ProvideErrorMetadata` and classified by [`api_error`].

use crate::api::{
    ApiResult, Attachment, AutoscalingApi, BlockDeviceMapping, CreateBucketRequest,
    CreateLoadBalancerRequest, Ec2Api, ElbApi, HealthCheck, InternetGateway, LaunchConfiguration,
    Listener, LoadBalancerDescription, S3Api, Tag,
};
use crate::client::AwsClient;
use crate::config::AwsConfig;
use crate::error::{ConfigError, Service, api_error};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use std::fmt::Debug;
use std::sync::Arc;
use stratus_cloud::{ApiError, ErrorKind};

/// Reduce an SDK failure to a classified error
///
/// Transport failures carry no code and are always fatal.
fn sdk_error<E, R>(service: Service, err: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: Debug,
{
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    match err.code() {
        Some(code) => api_error(service, code, message),
        None => {
            tracing::error!("{} request failed: {}", service, message);
            ApiError::new("RequestFailed", message, ErrorKind::Fatal)
        }
    }
}

/// A request the SDK refused to build locally
fn invalid_request(service: Service, err: impl std::fmt::Display) -> ApiError {
    api_error(service, "InvalidParameterValue", err.to_string())
}

fn to_i32(service: Service, field: &str, value: i64) -> ApiResult<i32> {
    i32::try_from(value).map_err(|_| invalid_request(service, format!("{field} out of range: {value}")))
}

impl AwsClient {
    /// Build a client backed by the AWS SDK
    ///
    /// Credentials come from the default provider chain; the region is
    /// taken from `config`.
    pub async fn from_sdk(config: AwsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;
        tracing::info!("AWS SDK configured for region {}", config.region);

        Ok(Self::new(
            config,
            Arc::new(SdkEc2(aws_sdk_ec2::Client::new(&sdk_config))),
            Arc::new(SdkS3(aws_sdk_s3::Client::new(&sdk_config))),
            Arc::new(SdkAutoscaling(aws_sdk_autoscaling::Client::new(&sdk_config))),
            Arc::new(SdkElb(aws_sdk_elasticloadbalancing::Client::new(&sdk_config))),
        ))
    }
}

// ============================================================================
// EC2
// ============================================================================

pub struct SdkEc2(pub aws_sdk_ec2::Client);

fn internet_gateway(gateway: &aws_sdk_ec2::types::InternetGateway) -> InternetGateway {
    InternetGateway {
        id: gateway.internet_gateway_id().unwrap_or_default().to_string(),
        attachments: gateway
            .attachments()
            .iter()
            .map(|a| Attachment {
                vpc_id: a.vpc_id().unwrap_or_default().to_string(),
                state: a.state().map(|s| s.as_str().to_string()).unwrap_or_default(),
            })
            .collect(),
        tags: gateway
            .tags()
            .iter()
            .map(|t| Tag::new(t.key().unwrap_or_default(), t.value().unwrap_or_default()))
            .collect(),
    }
}

#[async_trait]
impl Ec2Api for SdkEc2 {
    async fn create_internet_gateway(&self) -> ApiResult<InternetGateway> {
        let output = self
            .0
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| sdk_error(Service::Ec2, e))?;
        output
            .internet_gateway()
            .map(internet_gateway)
            .ok_or_else(|| invalid_request(Service::Ec2, "CreateInternetGateway returned no gateway"))
    }

    async fn describe_internet_gateways(&self, ids: &[String]) -> ApiResult<Vec<InternetGateway>> {
        let output = self
            .0
            .describe_internet_gateways()
            .set_internet_gateway_ids(Some(ids.to_vec()))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Ec2, e))?;
        Ok(output.internet_gateways().iter().map(internet_gateway).collect())
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ApiResult<()> {
        self.0
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error(Service::Ec2, e))?;
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ApiResult<()> {
        self.0
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error(Service::Ec2, e))?;
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> ApiResult<()> {
        self.0
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| sdk_error(Service::Ec2, e))?;
        Ok(())
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> ApiResult<()> {
        let tags = tags
            .iter()
            .map(|t| aws_sdk_ec2::types::Tag::builder().key(&t.key).value(&t.value).build())
            .collect();
        self.0
            .create_tags()
            .resources(resource_id)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Ec2, e))?;
        Ok(())
    }

    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> ApiResult<()> {
        let tags = keys
            .iter()
            .map(|k| aws_sdk_ec2::types::Tag::builder().key(k).build())
            .collect();
        self.0
            .delete_tags()
            .resources(resource_id)
            .set_tags(Some(tags))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Ec2, e))?;
        Ok(())
    }
}

// ============================================================================
// S3
// ============================================================================

pub struct SdkS3(pub aws_sdk_s3::Client);

#[async_trait]
impl S3Api for SdkS3 {
    async fn create_bucket(&self, request: &CreateBucketRequest) -> ApiResult<()> {
        use aws_sdk_s3::types::{BucketCannedAcl, BucketLocationConstraint, CreateBucketConfiguration};

        let mut call = self
            .0
            .create_bucket()
            .bucket(&request.bucket)
            .acl(BucketCannedAcl::from(request.acl.as_str()));
        if let Some(constraint) = &request.location_constraint {
            call = call.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(constraint.as_str()))
                    .build(),
            );
        }
        call.send().await.map_err(|e| sdk_error(Service::S3, e))?;
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> ApiResult<()> {
        match self.0.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            // HEAD responses have no body, so a missing bucket has no code
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                Err(api_error(Service::S3, "NotFound", format!("bucket {bucket} not found")))
            }
            Err(e) => Err(sdk_error(Service::S3, e)),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> ApiResult<()> {
        self.0
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error(Service::S3, e))?;
        Ok(())
    }
}

// ============================================================================
// Auto Scaling
// ============================================================================

pub struct SdkAutoscaling(pub aws_sdk_autoscaling::Client);

fn sdk_block_device(
    mapping: &BlockDeviceMapping,
) -> ApiResult<aws_sdk_autoscaling::types::BlockDeviceMapping> {
    use aws_sdk_autoscaling::types::Ebs;

    let volume_size = mapping
        .volume_size
        .map(|size| to_i32(Service::Autoscaling, "volume_size", size))
        .transpose()?;
    let ebs = Ebs::builder()
        .set_snapshot_id(mapping.snapshot_id.clone())
        .set_volume_type(mapping.volume_type.clone())
        .set_volume_size(volume_size)
        .delete_on_termination(mapping.delete_on_termination)
        .set_encrypted(mapping.encrypted)
        .build();
    aws_sdk_autoscaling::types::BlockDeviceMapping::builder()
        .device_name(&mapping.device_name)
        .set_virtual_name(mapping.virtual_name.clone())
        .ebs(ebs)
        .build()
        .map_err(|e| invalid_request(Service::Autoscaling, e))
}

fn launch_configuration(config: &aws_sdk_autoscaling::types::LaunchConfiguration) -> LaunchConfiguration {
    LaunchConfiguration {
        name: config.launch_configuration_name().unwrap_or_default().to_string(),
        image_id: config.image_id().unwrap_or_default().to_string(),
        instance_type: config.instance_type().unwrap_or_default().to_string(),
        iam_instance_profile: config.iam_instance_profile().map(str::to_string),
        key_name: config.key_name().map(str::to_string),
        user_data: config.user_data().map(str::to_string),
        security_groups: config.security_groups().to_vec(),
        associate_public_ip_address: config.associate_public_ip_address(),
        spot_price: config.spot_price().map(str::to_string),
        block_device_mappings: config
            .block_device_mappings()
            .iter()
            .map(|m| {
                let ebs = m.ebs();
                BlockDeviceMapping {
                    device_name: m.device_name().to_string(),
                    virtual_name: m.virtual_name().map(str::to_string),
                    snapshot_id: ebs.and_then(|e| e.snapshot_id()).map(str::to_string),
                    volume_type: ebs.and_then(|e| e.volume_type()).map(str::to_string),
                    volume_size: ebs.and_then(|e| e.volume_size()).map(i64::from),
                    delete_on_termination: ebs
                        .and_then(|e| e.delete_on_termination())
                        .unwrap_or(true),
                    encrypted: ebs.and_then(|e| e.encrypted()),
                }
            })
            .collect(),
    }
}

#[async_trait]
impl AutoscalingApi for SdkAutoscaling {
    async fn create_launch_configuration(&self, config: &LaunchConfiguration) -> ApiResult<()> {
        let mappings = config
            .block_device_mappings
            .iter()
            .map(sdk_block_device)
            .collect::<ApiResult<Vec<_>>>()?;

        self.0
            .create_launch_configuration()
            .launch_configuration_name(&config.name)
            .image_id(&config.image_id)
            .instance_type(&config.instance_type)
            .set_iam_instance_profile(config.iam_instance_profile.clone())
            .set_key_name(config.key_name.clone())
            .set_user_data(config.user_data.clone())
            .set_security_groups(Some(config.security_groups.clone()))
            .set_associate_public_ip_address(config.associate_public_ip_address)
            .set_spot_price(config.spot_price.clone())
            .set_block_device_mappings(Some(mappings))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Autoscaling, e))?;
        Ok(())
    }

    async fn describe_launch_configurations(
        &self,
        names: &[String],
    ) -> ApiResult<Vec<LaunchConfiguration>> {
        let output = self
            .0
            .describe_launch_configurations()
            .set_launch_configuration_names(Some(names.to_vec()))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Autoscaling, e))?;
        Ok(output
            .launch_configurations()
            .iter()
            .map(launch_configuration)
            .collect())
    }

    async fn delete_launch_configuration(&self, name: &str) -> ApiResult<()> {
        self.0
            .delete_launch_configuration()
            .launch_configuration_name(name)
            .send()
            .await
            .map_err(|e| sdk_error(Service::Autoscaling, e))?;
        Ok(())
    }
}

// ============================================================================
// Elastic Load Balancing
// ============================================================================

pub struct SdkElb(pub aws_sdk_elasticloadbalancing::Client);

fn sdk_listener(listener: &Listener) -> ApiResult<aws_sdk_elasticloadbalancing::types::Listener> {
    aws_sdk_elasticloadbalancing::types::Listener::builder()
        .protocol(&listener.lb_protocol)
        .load_balancer_port(to_i32(Service::Elb, "lb_port", listener.lb_port)?)
        .instance_protocol(&listener.instance_protocol)
        .instance_port(to_i32(Service::Elb, "instance_port", listener.instance_port)?)
        .set_ssl_certificate_id(listener.ssl_certificate_id.clone())
        .build()
        .map_err(|e| invalid_request(Service::Elb, e))
}

fn sdk_health_check(
    check: &HealthCheck,
) -> ApiResult<aws_sdk_elasticloadbalancing::types::HealthCheck> {
    aws_sdk_elasticloadbalancing::types::HealthCheck::builder()
        .target(&check.target)
        .interval(to_i32(Service::Elb, "interval", check.interval)?)
        .timeout(to_i32(Service::Elb, "timeout", check.timeout)?)
        .healthy_threshold(to_i32(Service::Elb, "healthy_threshold", check.healthy_threshold)?)
        .unhealthy_threshold(to_i32(
            Service::Elb,
            "unhealthy_threshold",
            check.unhealthy_threshold,
        )?)
        .build()
        .map_err(|e| invalid_request(Service::Elb, e))
}

fn sdk_instances(instances: &[String]) -> Vec<aws_sdk_elasticloadbalancing::types::Instance> {
    instances
        .iter()
        .map(|id| {
            aws_sdk_elasticloadbalancing::types::Instance::builder()
                .instance_id(id)
                .build()
        })
        .collect()
}

fn load_balancer(
    lb: &aws_sdk_elasticloadbalancing::types::LoadBalancerDescription,
) -> LoadBalancerDescription {
    LoadBalancerDescription {
        name: lb.load_balancer_name().unwrap_or_default().to_string(),
        dns_name: lb.dns_name().unwrap_or_default().to_string(),
        availability_zones: lb.availability_zones().to_vec(),
        listeners: lb
            .listener_descriptions()
            .iter()
            .filter_map(|d| d.listener())
            .map(|l| Listener {
                instance_port: i64::from(l.instance_port()),
                instance_protocol: l.instance_protocol().unwrap_or_default().to_string(),
                lb_port: i64::from(l.load_balancer_port()),
                lb_protocol: l.protocol().to_string(),
                ssl_certificate_id: l.ssl_certificate_id().map(str::to_string),
            })
            .collect(),
        health_check: lb.health_check().map(|h| HealthCheck {
            healthy_threshold: i64::from(h.healthy_threshold()),
            unhealthy_threshold: i64::from(h.unhealthy_threshold()),
            target: h.target().to_string(),
            interval: i64::from(h.interval()),
            timeout: i64::from(h.timeout()),
        }),
        instances: lb
            .instances()
            .iter()
            .filter_map(|i| i.instance_id())
            .map(str::to_string)
            .collect(),
    }
}

#[async_trait]
impl ElbApi for SdkElb {
    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest) -> ApiResult<String> {
        let listeners = request
            .listeners
            .iter()
            .map(sdk_listener)
            .collect::<ApiResult<Vec<_>>>()?;

        let output = self
            .0
            .create_load_balancer()
            .load_balancer_name(&request.name)
            .set_availability_zones(Some(request.availability_zones.clone()))
            .set_listeners(Some(listeners))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(output.dns_name().unwrap_or_default().to_string())
    }

    async fn describe_load_balancers(
        &self,
        names: &[String],
    ) -> ApiResult<Vec<LoadBalancerDescription>> {
        let output = self
            .0
            .describe_load_balancers()
            .set_load_balancer_names(Some(names.to_vec()))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(output
            .load_balancer_descriptions()
            .iter()
            .map(load_balancer)
            .collect())
    }

    async fn delete_load_balancer(&self, name: &str) -> ApiResult<()> {
        self.0
            .delete_load_balancer()
            .load_balancer_name(name)
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(())
    }

    async fn register_instances(&self, name: &str, instances: &[String]) -> ApiResult<()> {
        self.0
            .register_instances_with_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(sdk_instances(instances)))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(())
    }

    async fn deregister_instances(&self, name: &str, instances: &[String]) -> ApiResult<()> {
        self.0
            .deregister_instances_from_load_balancer()
            .load_balancer_name(name)
            .set_instances(Some(sdk_instances(instances)))
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(())
    }

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> ApiResult<()> {
        self.0
            .configure_health_check()
            .load_balancer_name(name)
            .health_check(sdk_health_check(health_check)?)
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(())
    }

    async fn cross_zone_load_balancing(&self, name: &str) -> ApiResult<bool> {
        let output = self
            .0
            .describe_load_balancer_attributes()
            .load_balancer_name(name)
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(output
            .load_balancer_attributes()
            .and_then(|a| a.cross_zone_load_balancing())
            .map(|c| c.enabled())
            .unwrap_or(false))
    }

    async fn set_cross_zone_load_balancing(&self, name: &str, enabled: bool) -> ApiResult<()> {
        use aws_sdk_elasticloadbalancing::types::{CrossZoneLoadBalancing, LoadBalancerAttributes};

        let cross_zone = CrossZoneLoadBalancing::builder()
            .enabled(enabled)
            .build()
            .map_err(|e| invalid_request(Service::Elb, e))?;
        self.0
            .modify_load_balancer_attributes()
            .load_balancer_name(name)
            .load_balancer_attributes(
                LoadBalancerAttributes::builder()
                    .cross_zone_load_balancing(cross_zone)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| sdk_error(Service::Elb, e))?;
        Ok(())
    }
}
