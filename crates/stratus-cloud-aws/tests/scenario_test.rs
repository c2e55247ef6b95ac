//! End-to-end scenarios driven through the registry against the in-memory cloud

mod common;

use common::{attrs, create, declarations, init_tracing};
use futures_util::future::join_all;
use serde_json::json;
use std::time::Duration;
use stratus_cloud::{Change, LogicalState, ResourceData};
use stratus_cloud_aws::testing::MemoryCloud;
use stratus_cloud_aws::{AwsConfig, registry};
use tokio::time::Instant;

#[tokio::test]
async fn test_bucket_outside_default_region_sets_location_constraint() {
    init_tracing();
    let registry = registry().unwrap();
    let cloud = MemoryCloud::with_region("eu-west-1");
    let client = cloud.client();

    create(
        &registry,
        &client,
        "aws_s3_bucket",
        attrs(json!({"bucket": "x", "acl": "private"})),
    )
    .await;

    let bucket = cloud.bucket("x").unwrap();
    assert_eq!(bucket.location_constraint.as_deref(), Some("eu-west-1"));
    assert_eq!(bucket.acl, "private");
}

#[tokio::test]
async fn test_bucket_in_default_region_omits_location_constraint() {
    init_tracing();
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    let client = cloud.client();

    create(
        &registry,
        &client,
        "aws_s3_bucket",
        attrs(json!({"bucket": "x", "acl": "private"})),
    )
    .await;

    assert_eq!(cloud.bucket("x").unwrap().location_constraint, None);
}

#[tokio::test(start_paused = true)]
async fn test_moving_gateway_detaches_then_attaches() {
    init_tracing();
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    let client = cloud.client();
    let record = create(
        &registry,
        &client,
        "aws_internet_gateway",
        attrs(json!({"vpc_id": "vpc-1"})),
    )
    .await;
    let id = record.id.clone();

    cloud.set_transition_describes(2);
    let calls_before = cloud.calls().len();
    let mutations_before = cloud.mutations().len();

    let mut d = ResourceData::for_update(record, attrs(json!({"vpc_id": "vpc-2"})));
    assert_eq!(
        registry.plan_change("aws_internet_gateway", &d).unwrap(),
        Change::Update(vec!["vpc_id"])
    );
    registry
        .update("aws_internet_gateway", &mut d, &client)
        .await
        .unwrap();

    assert_eq!(
        cloud.mutations()[mutations_before..],
        [
            format!("detach_internet_gateway {id} vpc-1"),
            format!("attach_internet_gateway {id} vpc-2"),
        ]
    );

    // Each call is followed by its own wait before the next one starts
    let calls = cloud.calls()[calls_before..].to_vec();
    let detach = calls.iter().position(|c| c.starts_with("detach_")).unwrap();
    let attach = calls.iter().position(|c| c.starts_with("attach_")).unwrap();
    let describes_between = calls[detach..attach]
        .iter()
        .filter(|c| c.starts_with("describe_internet_gateways"))
        .count();
    assert_eq!(describes_between, 3);
    assert!(calls[attach..].iter().any(|c| c.starts_with("describe_")));

    let gateway = cloud.gateway(&id).unwrap();
    assert_eq!(gateway.attachments.len(), 1);
    assert_eq!(gateway.attachments[0].vpc_id, "vpc-2");
    assert_eq!(gateway.attachments[0].state, "available");
    assert_eq!(d.logical_state(), LogicalState::Available);
}

#[tokio::test(start_paused = true)]
async fn test_removing_vpc_and_tags_detaches_and_untags() {
    init_tracing();
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    let client = cloud.client();
    let record = create(
        &registry,
        &client,
        "aws_internet_gateway",
        attrs(json!({"vpc_id": "vpc-1", "tags": {"Name": "main"}})),
    )
    .await;
    let id = record.id.clone();
    let mutations_before = cloud.mutations().len();

    let mut d = ResourceData::for_update(record, attrs(json!({})));
    assert_eq!(
        registry.plan_change("aws_internet_gateway", &d).unwrap(),
        Change::Update(vec!["vpc_id", "tags"])
    );
    registry
        .update("aws_internet_gateway", &mut d, &client)
        .await
        .unwrap();

    assert_eq!(
        cloud.mutations()[mutations_before..],
        [
            format!("detach_internet_gateway {id} vpc-1"),
            format!("delete_tags {id} Name"),
        ]
    );
    let gateway = cloud.gateway(&id).unwrap();
    assert!(gateway.attachments.is_empty());
    assert!(gateway.tags.is_empty());

    let record = d.into_record();
    assert!(!record.attributes.contains_key("vpc_id"));
    assert!(!record.attributes.contains_key("tags"));
    assert_eq!(record.logical_state, LogicalState::Detached);

    let d = ResourceData::for_update(record, attrs(json!({})));
    assert_eq!(
        registry.plan_change("aws_internet_gateway", &d).unwrap(),
        Change::NoOp
    );
}

#[tokio::test(start_paused = true)]
async fn test_attach_converges_after_grace_period() {
    init_tracing();
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    // EC2 never leaves "attaching" on its own
    cloud.set_transition_describes(u32::MAX);
    let client = cloud.client();
    let grace = client.config.timeouts.attach_grace();

    let start = Instant::now();
    let record = create(
        &registry,
        &client,
        "aws_internet_gateway",
        attrs(json!({"vpc_id": "vpc-1"})),
    )
    .await;
    let elapsed = start.elapsed();

    assert!(elapsed >= grace, "converged after {elapsed:?}");
    assert!(elapsed < client.config.timeouts.attach());
    assert_eq!(record.logical_state, LogicalState::Available);
    assert_eq!(cloud.gateway(&record.id).unwrap().attachments[0].state, "attaching");
}

#[tokio::test(start_paused = true)]
async fn test_attach_times_out_on_short_budget() {
    init_tracing();
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    cloud.set_transition_describes(u32::MAX);
    let mut config = AwsConfig::default();
    config.timeouts.attach_secs = 5;
    let client = cloud.client_with(config);

    let mut d = ResourceData::for_create("aws_internet_gateway", attrs(json!({"vpc_id": "vpc-1"})));
    let err = registry
        .create("aws_internet_gateway", &mut d, &client)
        .await
        .unwrap_err();

    assert!(err.is_timeout(), "{err:?}");
    // The gateway exists, so the id must survive for the next run
    assert!(!d.id().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_handlers_share_one_client() {
    init_tracing();
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    cloud.set_transition_describes(1);
    let client = cloud.client();

    let creates = (0..8).map(|i| {
        let declared = attrs(json!({"vpc_id": format!("vpc-{i}")}));
        create(&registry, &client, "aws_internet_gateway", declared)
    });
    let records = join_all(creates).await;

    let mut ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    for record in &records {
        let gateway = cloud.gateway(&record.id).unwrap();
        assert_eq!(gateway.attachments[0].vpc_id, record.attributes["vpc_id"]);
    }
}

#[tokio::test]
async fn test_plan_change_for_every_type() {
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    let client = cloud.client();

    for (resource_type, declared) in declarations() {
        let d = ResourceData::for_create(resource_type, declared.clone());
        assert_eq!(
            registry.plan_change(resource_type, &d).unwrap(),
            Change::Replace(Vec::new())
        );

        let record = create(&registry, &client, resource_type, declared.clone()).await;
        let d = ResourceData::for_update(record, declared);
        assert_eq!(
            registry.plan_change(resource_type, &d).unwrap(),
            Change::NoOp,
            "{resource_type}"
        );
    }
}

#[tokio::test]
async fn test_renaming_bucket_forces_replacement() {
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    let client = cloud.client();
    let record = create(
        &registry,
        &client,
        "aws_s3_bucket",
        attrs(json!({"bucket": "x", "acl": "private"})),
    )
    .await;

    let d = ResourceData::for_update(record, attrs(json!({"bucket": "y", "acl": "private"})));
    assert_eq!(
        registry.plan_change("aws_s3_bucket", &d).unwrap(),
        Change::Replace(vec!["bucket"])
    );
}

#[tokio::test(start_paused = true)]
async fn test_read_is_a_single_describe() {
    let registry = registry().unwrap();
    let cloud = MemoryCloud::new();
    let client = cloud.client();
    let record = create(
        &registry,
        &client,
        "aws_internet_gateway",
        attrs(json!({"vpc_id": "vpc-1"})),
    )
    .await;
    cloud.set_transition_describes(5);
    client.ec2.detach_internet_gateway(&record.id, "vpc-1").await.unwrap();
    let before = cloud.count("describe_internet_gateways");

    let start = Instant::now();
    let mut d = ResourceData::from_record(record);
    registry
        .read("aws_internet_gateway", &mut d, &client)
        .await
        .unwrap();

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(cloud.count("describe_internet_gateways"), before + 1);
    assert_eq!(d.logical_state(), LogicalState::Detaching);
}
