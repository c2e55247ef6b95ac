//! In-memory AWS for tests and dry runs
//!
//! [`MemoryCloud`] implements every API trait over plain maps. It records
//! each call in order and can be scripted to behave like the real services
//! do at their worst: attachments that linger in `attaching`/`detaching`,
//! objects that stay invisible for a few describes after creation, and
//! one-shot error codes on any operation.

use crate::api::{
    ApiResult, Attachment, AutoscalingApi, CreateBucketRequest, CreateLoadBalancerRequest, Ec2Api,
    ElbApi, HealthCheck, InternetGateway, LaunchConfiguration, LoadBalancerDescription, S3Api, Tag,
};
use crate::client::AwsClient;
use crate::config::{AwsConfig, DEFAULT_REGION};
use crate::error::{Service, api_error};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use stratus_cloud::ApiError;

struct Transition {
    /// Describes left before the transition settles
    remaining: u32,
    /// Attachment after settling; `None` removes it
    settled: Option<Attachment>,
}

struct GatewayEntry {
    gateway: InternetGateway,
    transition: Option<Transition>,
}

struct LoadBalancerEntry {
    description: LoadBalancerDescription,
    cross_zone: bool,
}

#[derive(Default)]
struct State {
    next_id: u64,
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<String>>,
    /// Describes an object stays invisible, keyed by id or name
    hidden: HashMap<String, u32>,
    consistency_lag: u32,
    transition_describes: u32,
    gateways: BTreeMap<String, GatewayEntry>,
    buckets: BTreeMap<String, CreateBucketRequest>,
    launch_configurations: BTreeMap<String, LaunchConfiguration>,
    load_balancers: BTreeMap<String, LoadBalancerEntry>,
    launch_configuration_answer: Option<String>,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    /// Log a call and pop a scripted failure for it
    fn enter(&mut self, service: Service, operation: &str, target: &str) -> ApiResult<()> {
        self.calls.push(format!("{operation} {target}").trim_end().to_string());
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(code) => Err(api_error(service, &code, format!("injected failure of {operation}"))),
            None => Ok(()),
        }
    }

    fn created(&mut self, id: &str) {
        if self.consistency_lag > 0 {
            self.hidden.insert(id.to_string(), self.consistency_lag);
        }
    }

    /// Whether `id` is still invisible; counts one describe
    fn is_hidden(&mut self, id: &str) -> bool {
        match self.hidden.get_mut(id) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn start_transition(&mut self, id: &str, pending: &str, settled: Option<Attachment>) {
        let remaining = self.transition_describes;
        let Some(entry) = self.gateways.get_mut(id) else {
            return;
        };
        if remaining == 0 {
            entry.gateway.attachments = settled.into_iter().collect();
            return;
        }
        let vpc_id = settled
            .as_ref()
            .or(entry.gateway.attachments.first())
            .map(|a| a.vpc_id.clone())
            .unwrap_or_default();
        entry.gateway.attachments = vec![Attachment {
            vpc_id,
            state: pending.to_string(),
        }];
        entry.transition = Some(Transition { remaining, settled });
    }
}

impl GatewayEntry {
    /// Advance a scripted transition by one describe
    fn observe(&mut self) -> InternetGateway {
        if let Some(transition) = &mut self.transition {
            if transition.remaining > 0 {
                transition.remaining -= 1;
            } else {
                self.gateway.attachments = transition.settled.take().into_iter().collect();
                self.transition = None;
            }
        }
        self.gateway.clone()
    }
}

/// Scriptable in-memory implementation of all AWS API traits
pub struct MemoryCloud {
    region: String,
    state: Mutex<State>,
}

impl MemoryCloud {
    pub fn new() -> Arc<Self> {
        Self::with_region(DEFAULT_REGION)
    }

    pub fn with_region(region: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            region: region.into(),
            state: Mutex::new(State::default()),
        })
    }

    /// Client backed by this cloud, configured for its region
    pub fn client(self: &Arc<Self>) -> AwsClient {
        self.client_with(AwsConfig::new(self.region.clone()))
    }

    pub fn client_with(self: &Arc<Self>, config: AwsConfig) -> AwsClient {
        AwsClient::new(
            config,
            self.clone(),
            self.clone(),
            self.clone(),
            self.clone(),
        )
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every call so far as `"<operation> <targets>"`, in order
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Calls other than describes and heads
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("describe_") && !c.starts_with("head_"))
            .collect()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .count()
    }

    /// Fail the next call of `operation` with `code`
    pub fn fail_next(&self, operation: &str, code: &str) {
        self.fail_times(operation, code, 1);
    }

    /// Fail the next `times` calls of `operation` with `code`
    pub fn fail_times(&self, operation: &str, code: &str, times: usize) {
        let mut state = self.state();
        let queue = state.failures.entry(operation.to_string()).or_default();
        queue.extend(std::iter::repeat_n(code.to_string(), times));
    }

    /// Keep objects invisible for `describes` lookups after they are created
    pub fn set_consistency_lag(&self, describes: u32) {
        self.state().consistency_lag = describes;
    }

    /// Keep attachments in `attaching`/`detaching` for `describes` lookups
    pub fn set_transition_describes(&self, describes: u32) {
        self.state().transition_describes = describes;
    }

    pub fn insert_gateway(&self, gateway: InternetGateway) {
        let entry = GatewayEntry {
            gateway: gateway.clone(),
            transition: None,
        };
        self.state().gateways.insert(gateway.id, entry);
    }

    pub fn gateway(&self, id: &str) -> Option<InternetGateway> {
        self.state().gateways.get(id).map(|e| e.gateway.clone())
    }

    pub fn bucket(&self, bucket: &str) -> Option<CreateBucketRequest> {
        self.state().buckets.get(bucket).cloned()
    }

    pub fn launch_configuration(&self, name: &str) -> Option<LaunchConfiguration> {
        self.state().launch_configurations.get(name).cloned()
    }

    pub fn load_balancer(&self, name: &str) -> Option<LoadBalancerDescription> {
        self.state()
            .load_balancers
            .get(name)
            .map(|e| e.description.clone())
    }

    /// Make describes of launch configurations answer with a configuration named `name`
    pub fn answer_launch_configurations_with(&self, name: &str) {
        let mut state = self.state();
        state.launch_configuration_answer = Some(name.to_string());
        state.launch_configurations.insert(
            name.to_string(),
            LaunchConfiguration {
                name: name.to_string(),
                ..Default::default()
            },
        );
    }
}

#[async_trait]
impl Ec2Api for MemoryCloud {
    async fn create_internet_gateway(&self) -> ApiResult<InternetGateway> {
        let mut state = self.state();
        state.enter(Service::Ec2, "create_internet_gateway", "")?;
        let id = state.next_id("igw");
        let gateway = InternetGateway {
            id: id.clone(),
            attachments: Vec::new(),
            tags: Vec::new(),
        };
        state.gateways.insert(
            id.clone(),
            GatewayEntry {
                gateway: gateway.clone(),
                transition: None,
            },
        );
        state.created(&id);
        Ok(gateway)
    }

    async fn describe_internet_gateways(&self, ids: &[String]) -> ApiResult<Vec<InternetGateway>> {
        let mut state = self.state();
        state.enter(Service::Ec2, "describe_internet_gateways", &ids.join(","))?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            let visible = !state.is_hidden(id);
            match state.gateways.get_mut(id) {
                Some(entry) if visible => found.push(entry.observe()),
                _ => {
                    return Err(api_error(
                        Service::Ec2,
                        "InvalidInternetGatewayID.NotFound",
                        format!("The internetGateway ID '{id}' does not exist"),
                    ));
                }
            }
        }
        Ok(found)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(
            Service::Ec2,
            "attach_internet_gateway",
            &format!("{gateway_id} {vpc_id}"),
        )?;
        let Some(entry) = state.gateways.get(gateway_id) else {
            return Err(api_error(
                Service::Ec2,
                "InvalidInternetGatewayID.NotFound",
                format!("The internetGateway ID '{gateway_id}' does not exist"),
            ));
        };
        if !entry.gateway.attachments.is_empty() {
            return Err(api_error(
                Service::Ec2,
                "Resource.AlreadyAssociated",
                format!("resource {gateway_id} is already attached"),
            ));
        }
        let settled = Attachment {
            vpc_id: vpc_id.to_string(),
            state: "available".to_string(),
        };
        state.start_transition(gateway_id, "attaching", Some(settled));
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(
            Service::Ec2,
            "detach_internet_gateway",
            &format!("{gateway_id} {vpc_id}"),
        )?;
        let Some(entry) = state.gateways.get(gateway_id) else {
            return Err(api_error(
                Service::Ec2,
                "InvalidInternetGatewayID.NotFound",
                format!("The internetGateway ID '{gateway_id}' does not exist"),
            ));
        };
        if !entry.gateway.attachments.iter().any(|a| a.vpc_id == vpc_id) {
            return Err(api_error(
                Service::Ec2,
                "Gateway.NotAttached",
                format!("resource {gateway_id} is not attached to network {vpc_id}"),
            ));
        }
        state.start_transition(gateway_id, "detaching", None);
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::Ec2, "delete_internet_gateway", gateway_id)?;
        match state.gateways.get(gateway_id) {
            None => Err(api_error(
                Service::Ec2,
                "InvalidInternetGatewayID.NotFound",
                format!("The internetGateway ID '{gateway_id}' does not exist"),
            )),
            Some(entry) if !entry.gateway.attachments.is_empty() => Err(api_error(
                Service::Ec2,
                "DependencyViolation",
                format!("The internetGateway '{gateway_id}' has dependencies and cannot be deleted"),
            )),
            Some(_) => {
                state.gateways.remove(gateway_id);
                Ok(())
            }
        }
    }

    async fn create_tags(&self, resource_id: &str, tags: &[Tag]) -> ApiResult<()> {
        let mut state = self.state();
        let keys: Vec<&str> = tags.iter().map(|t| t.key.as_str()).collect();
        state.enter(
            Service::Ec2,
            "create_tags",
            &format!("{resource_id} {}", keys.join(",")),
        )?;
        if let Some(entry) = state.gateways.get_mut(resource_id) {
            for tag in tags {
                entry.gateway.tags.retain(|t| t.key != tag.key);
                entry.gateway.tags.push(tag.clone());
            }
        }
        Ok(())
    }

    async fn delete_tags(&self, resource_id: &str, keys: &[String]) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(
            Service::Ec2,
            "delete_tags",
            &format!("{resource_id} {}", keys.join(",")),
        )?;
        if let Some(entry) = state.gateways.get_mut(resource_id) {
            entry.gateway.tags.retain(|t| !keys.contains(&t.key));
        }
        Ok(())
    }
}

#[async_trait]
impl S3Api for MemoryCloud {
    async fn create_bucket(&self, request: &CreateBucketRequest) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::S3, "create_bucket", &request.bucket)?;

        // S3 only accepts a location constraint naming the endpoint's own
        // region, and rejects one for us-east-1
        let expected = (self.region != DEFAULT_REGION).then_some(self.region.as_str());
        if request.location_constraint.as_deref() != expected {
            return Err(api_error(
                Service::S3,
                "IllegalLocationConstraintException",
                format!(
                    "location constraint {:?} is incompatible with region {}",
                    request.location_constraint, self.region
                ),
            ));
        }
        if state.buckets.contains_key(&request.bucket) {
            return Err(api_error(
                Service::S3,
                "BucketAlreadyOwnedByYou",
                format!("bucket {} already exists", request.bucket),
            ));
        }
        state.buckets.insert(request.bucket.clone(), request.clone());
        state.created(&request.bucket);
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::S3, "head_bucket", bucket)?;
        if state.is_hidden(bucket) || !state.buckets.contains_key(bucket) {
            return Err(api_error(Service::S3, "NotFound", "Not Found"));
        }
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::S3, "delete_bucket", bucket)?;
        match state.buckets.remove(bucket) {
            Some(_) => Ok(()),
            None => Err(api_error(
                Service::S3,
                "NoSuchBucket",
                "The specified bucket does not exist",
            )),
        }
    }
}

#[async_trait]
impl AutoscalingApi for MemoryCloud {
    async fn create_launch_configuration(&self, config: &LaunchConfiguration) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::Autoscaling, "create_launch_configuration", &config.name)?;
        if state.launch_configurations.contains_key(&config.name) {
            return Err(api_error(
                Service::Autoscaling,
                "AlreadyExists",
                format!("Launch Configuration by this name ({}) already exists", config.name),
            ));
        }
        state
            .launch_configurations
            .insert(config.name.clone(), config.clone());
        state.created(&config.name);
        Ok(())
    }

    async fn describe_launch_configurations(
        &self,
        names: &[String],
    ) -> ApiResult<Vec<LaunchConfiguration>> {
        let mut state = self.state();
        state.enter(
            Service::Autoscaling,
            "describe_launch_configurations",
            &names.join(","),
        )?;
        if let Some(answer) = state.launch_configuration_answer.clone() {
            return Ok(state
                .launch_configurations
                .get(&answer)
                .cloned()
                .into_iter()
                .collect());
        }
        let mut found = Vec::new();
        for name in names {
            if state.is_hidden(name) {
                continue;
            }
            if let Some(config) = state.launch_configurations.get(name) {
                found.push(config.clone());
            }
        }
        Ok(found)
    }

    async fn delete_launch_configuration(&self, name: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::Autoscaling, "delete_launch_configuration", name)?;
        match state.launch_configurations.remove(name) {
            Some(_) => Ok(()),
            None => Err(api_error(
                Service::Autoscaling,
                "InvalidConfiguration.NotFound",
                format!("Launch configuration name not found - {name}"),
            )),
        }
    }
}

fn load_balancer_not_found(name: &str) -> ApiError {
    api_error(
        Service::Elb,
        "LoadBalancerNotFound",
        format!("There is no ACTIVE Load Balancer named '{name}'"),
    )
}

#[async_trait]
impl ElbApi for MemoryCloud {
    async fn create_load_balancer(&self, request: &CreateLoadBalancerRequest) -> ApiResult<String> {
        let mut state = self.state();
        state.enter(Service::Elb, "create_load_balancer", &request.name)?;
        if state.load_balancers.contains_key(&request.name) {
            return Err(api_error(
                Service::Elb,
                "DuplicateLoadBalancerName",
                format!("Load balancer {} already exists", request.name),
            ));
        }
        let suffix = state.next_id("lb");
        let dns_name = format!("{}-{suffix}.{}.elb.amazonaws.com", request.name, self.region);
        let description = LoadBalancerDescription {
            name: request.name.clone(),
            dns_name: dns_name.clone(),
            availability_zones: request.availability_zones.clone(),
            listeners: request.listeners.clone(),
            health_check: None,
            instances: Vec::new(),
        };
        state.load_balancers.insert(
            request.name.clone(),
            LoadBalancerEntry {
                description,
                cross_zone: false,
            },
        );
        state.created(&request.name);
        Ok(dns_name)
    }

    async fn describe_load_balancers(
        &self,
        names: &[String],
    ) -> ApiResult<Vec<LoadBalancerDescription>> {
        let mut state = self.state();
        state.enter(Service::Elb, "describe_load_balancers", &names.join(","))?;
        let mut found = Vec::new();
        for name in names {
            let visible = !state.is_hidden(name);
            match state.load_balancers.get(name) {
                Some(entry) if visible => found.push(entry.description.clone()),
                _ => return Err(load_balancer_not_found(name)),
            }
        }
        Ok(found)
    }

    async fn delete_load_balancer(&self, name: &str) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::Elb, "delete_load_balancer", name)?;
        state
            .load_balancers
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| load_balancer_not_found(name))
    }

    async fn register_instances(&self, name: &str, instances: &[String]) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(
            Service::Elb,
            "register_instances",
            &format!("{name} {}", instances.join(",")),
        )?;
        let entry = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| load_balancer_not_found(name))?;
        for instance in instances {
            if !entry.description.instances.contains(instance) {
                entry.description.instances.push(instance.clone());
            }
        }
        Ok(())
    }

    async fn deregister_instances(&self, name: &str, instances: &[String]) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(
            Service::Elb,
            "deregister_instances",
            &format!("{name} {}", instances.join(",")),
        )?;
        let entry = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| load_balancer_not_found(name))?;
        entry
            .description
            .instances
            .retain(|i| !instances.contains(i));
        Ok(())
    }

    async fn configure_health_check(&self, name: &str, health_check: &HealthCheck) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(Service::Elb, "configure_health_check", name)?;
        let entry = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| load_balancer_not_found(name))?;
        entry.description.health_check = Some(health_check.clone());
        Ok(())
    }

    async fn cross_zone_load_balancing(&self, name: &str) -> ApiResult<bool> {
        let mut state = self.state();
        state.enter(Service::Elb, "describe_load_balancer_attributes", name)?;
        state
            .load_balancers
            .get(name)
            .map(|e| e.cross_zone)
            .ok_or_else(|| load_balancer_not_found(name))
    }

    async fn set_cross_zone_load_balancing(&self, name: &str, enabled: bool) -> ApiResult<()> {
        let mut state = self.state();
        state.enter(
            Service::Elb,
            "modify_load_balancer_attributes",
            &format!("{name} {enabled}"),
        )?;
        let entry = state
            .load_balancers
            .get_mut(name)
            .ok_or_else(|| load_balancer_not_found(name))?;
        entry.cross_zone = enabled;
        Ok(())
    }
}
