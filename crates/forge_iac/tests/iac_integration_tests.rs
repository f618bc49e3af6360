//! End-to-end tests: stack file -> composed graph -> local reconciliation.

use std::sync::Arc;

use forge_core::{
    EdgeKind, LocalRuntime, MockRuntime, Reconciler, ResourceId, ResourceOutcome, RunState,
};
use forge_iac::{
    IacError, StackFile, TopologyComposer, TopologyFeatures, APPLICATION_DOMAIN,
    DATABASE_ENDPOINT, LOAD_BALANCER_DNS,
};
use tempfile::TempDir;

const STACK_YAML: &str = r#"
project: webapp
environment: dev
features:
  database: true
  loadBalancer: true
  autoscaling: true
  eventing: true
config:
  vpcCidr: 10.0.0.0/16
  ipv4Cidr: 0.0.0.0/0
  ipv6Cidr: "::/0"
  sshKeyName: ec2-key
  instanceType: t2.micro
  amiId: ami-0abc
  ports: [22, 8080]
  loadBalancerPorts: [80, 443]
  aws:profile: dev
  aws:region: us-east-1
  application:user: csye6225
  application:userGroup: csye6225
  application:port: 8080
  application:resourceFile: /opt/app/submissions
  application:propertyFile: /opt/app/application.properties
  application:logFile: /var/log/app.log
  application:cloudwatchConfigFile: /opt/cloudwatch.json
  application:binaryFile: /opt/app/app.jar
  application:domainName: example.com
  application:healthCheckPath: /healthz
  application:gcpProject: gcp-dev
  path: ./serverless.zip
  database:family: mariadb10.6
  database:storageSize: 20
  database:engine: mariadb
  database:engineVersion: "10.6"
  database:instanceClass: db.t3.micro
  database:name: csye6225
  database:masterUser: admin
  database:masterPassword: secret
  database:port: 3306
lookup:
  zones: [us-east-1a, us-east-1b, us-east-1c, us-east-1d]
  certificates:
    dev.example.com: arn:aws:acm:us-east-1:123:certificate/abc
  hostedZones:
    dev.example.com: Z0123
"#;

fn stack_file() -> StackFile {
    StackFile::from_yaml(STACK_YAML).unwrap()
}

fn with_features(features: TopologyFeatures) -> StackFile {
    let mut stack = stack_file();
    stack.features = features;
    stack
}

#[tokio::test]
async fn test_subnets_follow_zone_order() {
    let composed = TopologyComposer::from_stack_file(&stack_file())
        .compose()
        .await
        .unwrap();

    let public: Vec<String> = composed.plan.public().iter().map(|s| s.cidr.to_string()).collect();
    let private: Vec<String> = composed.plan.private().iter().map(|s| s.cidr.to_string()).collect();
    assert_eq!(public, vec!["10.0.0.0/24", "10.0.1.0/24", "10.0.2.0/24"]);
    assert_eq!(private, vec!["10.0.3.0/24", "10.0.4.0/24", "10.0.5.0/24"]);
    assert_eq!(composed.plan.private()[2].zone.as_str(), "us-east-1c");

    let subnet = composed
        .graph
        .get(&ResourceId::new("private-subnet-2"))
        .unwrap()
        .declaration
        .describe_properties();
    assert_eq!(subnet["cidrBlock"], "10.0.4.0/24");
    assert_eq!(subnet["availabilityZone"], "us-east-1b");
    assert!(subnet.get("mapPublicIpOnLaunch").is_none());
}

#[tokio::test]
async fn test_database_precedes_launch_template() {
    let composed = TopologyComposer::from_stack_file(&stack_file())
        .compose()
        .await
        .unwrap();
    let db = ResourceId::new("assessment-application-database");
    let template = ResourceId::new("csye6225_asg");

    assert_eq!(composed.graph.edge_kind(&db, &template), Some(EdgeKind::Explicit));

    let report = composed.report();
    let wave_of = |id: &str| {
        report
            .waves
            .iter()
            .position(|wave| wave.iter().any(|w| w == id))
            .unwrap()
    };
    assert!(wave_of("assessment-application-database") < wave_of("csye6225_asg"));
    assert!(wave_of("my-vpc") < wave_of("public-subnet-1"));
    assert_eq!(report.outputs.len(), 3);
}

#[tokio::test]
async fn test_name_override_is_used_everywhere() {
    let mut stack = stack_file();
    stack.config = stack.config.clone().with("vpcName", "main-vpc");
    let composed = TopologyComposer::from_stack_file(&stack).compose().await.unwrap();

    assert!(composed.graph.contains(&ResourceId::new("main-vpc")));
    assert!(!composed.graph.contains(&ResourceId::new("my-vpc")));
    let vpc = composed
        .graph
        .get(&ResourceId::new("main-vpc"))
        .unwrap()
        .declaration
        .describe_properties();
    assert_eq!(vpc["tags"]["Name"], "main-vpc");
}

#[tokio::test]
async fn test_feature_variants() {
    let eventing_ids = ["assessment-application-topic", "assessment-application-lambda", "SNS-policy"];

    let composed = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::web()))
        .compose()
        .await
        .unwrap();
    for id in eventing_ids {
        assert!(!composed.graph.contains(&ResourceId::new(id)), "{} declared", id);
    }
    assert!(composed.graph.contains(&ResourceId::new("auto-scaling-group")));

    let composed = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::single_instance()))
        .compose()
        .await
        .unwrap();
    assert!(composed.graph.contains(&ResourceId::new("assessment-application-instance")));
    assert!(!composed.graph.contains(&ResourceId::new("csye6225_asg")));
    assert!(!composed.graph.contains(&ResourceId::new("load-balancer")));
    let names: Vec<&str> = composed.graph.exports().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec![DATABASE_ENDPOINT, APPLICATION_DOMAIN]);
}

#[tokio::test]
async fn test_lookup_and_capacity_failures() {
    let mut stack = stack_file();
    stack.lookup.certificates.clear();
    let err = TopologyComposer::from_stack_file(&stack).compose().await.unwrap_err();
    assert!(matches!(err, IacError::ExternalLookup(_)));

    let mut stack = stack_file();
    stack.lookup.zones.clear();
    let err = TopologyComposer::from_stack_file(&stack).compose().await.unwrap_err();
    assert!(matches!(err, IacError::Capacity(_)));

    let mut stack = stack_file();
    stack.config = stack.config.clone().with("vpcCidr", "10.0.0.0/23");
    let err = TopologyComposer::from_stack_file(&stack).compose().await.unwrap_err();
    assert!(matches!(err, IacError::Capacity(_)));
}

#[tokio::test]
async fn test_apply_full_stack_locally() {
    let dir = TempDir::new().unwrap();
    let composed = TopologyComposer::from_stack_file(&stack_file())
        .compose()
        .await
        .unwrap();
    let runtime = Arc::new(LocalRuntime::open(dir.path().join("state.json")).unwrap());
    let reconciler = Reconciler::new(runtime.clone()).with_log_dir(dir.path());

    let log = reconciler.apply(&composed.stack, &composed.graph).await.unwrap();
    assert_eq!(log.state, RunState::Completed);
    assert_eq!(log.with_outcome(ResourceOutcome::Created).len(), composed.graph.len());
    assert!(log.outputs[DATABASE_ENDPOINT].ends_with(":3306"));
    assert!(log.outputs[LOAD_BALANCER_DNS].ends_with(".elb.local"));
    assert_eq!(log.outputs[APPLICATION_DOMAIN], "dev.example.com");

    let template = runtime.get(&ResourceId::new("csye6225_asg")).unwrap();
    assert_eq!(template.depends_on, composed.graph.producers_of(&ResourceId::new("csye6225_asg")));
}

#[tokio::test]
async fn test_single_instance_user_data_carries_database_host() {
    let composed = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::single_instance()))
        .compose()
        .await
        .unwrap();
    let runtime = MockRuntime::new().with_attribute(
        "assessment-application-database",
        "address",
        "db-1.example.internal",
    );
    Reconciler::new(Arc::new(runtime.clone()))
        .apply(&composed.stack, &composed.graph)
        .await
        .unwrap();

    let instance = runtime.applied_properties("assessment-application-instance").unwrap();
    let user_data = instance["userData"].as_str().unwrap();
    assert!(user_data.contains("echo 'DB_HOST=db-1.example.internal'"));
    assert!(user_data.contains("DB_PORT=3306"));
    assert!(user_data.contains("DB_PASSWORD=secret"));
    assert!(!user_data.contains("SUBMISSION_TOPIC_ARN"));
}

#[tokio::test]
async fn test_failed_resource_stops_dependents() {
    let composed = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::single_instance()))
        .compose()
        .await
        .unwrap();
    let runtime = MockRuntime::new().fail_on("assessment-application-database", "quota exceeded");

    let err = Reconciler::new(Arc::new(runtime.clone()))
        .apply(&composed.stack, &composed.graph)
        .await
        .unwrap_err();
    assert!(IacError::from(err).is_resource_failure());
    assert!(!runtime.was_applied("assessment-application-instance"));
    assert!(runtime.was_applied("my-vpc"));
}

#[tokio::test]
async fn test_destroy_after_feature_change_empties_state() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state.json");

    let full = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::all()))
        .compose()
        .await
        .unwrap();
    Reconciler::new(Arc::new(LocalRuntime::open(&state).unwrap()))
        .apply(&full.stack, &full.graph)
        .await
        .unwrap();

    // Eventing is switched off before tearing the stack down.
    let web = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::web()))
        .compose()
        .await
        .unwrap();
    assert!(web.graph.len() < full.graph.len());

    let runtime = Arc::new(LocalRuntime::open(&state).unwrap());
    let log = Reconciler::new(runtime.clone())
        .destroy(&web.stack, &web.graph)
        .await
        .unwrap();

    assert_eq!(log.state, RunState::Completed);
    assert!(runtime.resource_ids().is_empty(), "left behind: {:?}", runtime.resource_ids());
    assert_eq!(log.with_outcome(ResourceOutcome::Deleted).len(), full.graph.len());
}

#[tokio::test]
async fn test_reapply_after_feature_change_prunes_state() {
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(LocalRuntime::open(dir.path().join("state.json")).unwrap());
    let reconciler = Reconciler::new(runtime.clone());

    let full = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::all()))
        .compose()
        .await
        .unwrap();
    reconciler.apply(&full.stack, &full.graph).await.unwrap();

    let web = TopologyComposer::from_stack_file(&with_features(TopologyFeatures::web()))
        .compose()
        .await
        .unwrap();
    let log = reconciler.apply(&web.stack, &web.graph).await.unwrap();

    assert_eq!(log.state, RunState::Completed);
    let deleted = log.with_outcome(ResourceOutcome::Deleted);
    for id in ["assessment-application-topic", "assessment-application-lambda", "SNS-policy"] {
        assert!(deleted.iter().any(|d| d.as_str() == id), "{} not deleted", id);
    }
    let declared: Vec<ResourceId> = web.graph.resources().map(|r| r.declaration.id.clone()).collect();
    let mut held = runtime.resource_ids();
    let mut expected = declared.clone();
    held.sort();
    expected.sort();
    assert_eq!(held, expected);
}

#[tokio::test]
async fn test_master_password_never_written_out() {
    const PASSWORD: &str = "Tr0ub4dor-and-3";
    let dir = TempDir::new().unwrap();
    let mut stack = stack_file();
    stack.config = stack.config.clone().with("database:masterPassword", PASSWORD);
    let composed = TopologyComposer::from_stack_file(&stack).compose().await.unwrap();

    let report = serde_json::to_string(&composed.report()).unwrap();
    assert!(!report.contains(PASSWORD));
    assert!(report.contains("<secret>"));

    let runtime = MockRuntime::new();
    let state = dir.path().join("state.json");
    let local = Arc::new(LocalRuntime::open(&state).unwrap());
    Reconciler::new(local.clone())
        .with_log_dir(dir.path())
        .apply(&composed.stack, &composed.graph)
        .await
        .unwrap();
    let content = std::fs::read_to_string(&state).unwrap();
    assert!(!content.contains(PASSWORD));
    for id in ["assessment-application-database", "csye6225_asg"] {
        let stored = local.get(&ResourceId::new(id)).unwrap();
        let digest = if id == "csye6225_asg" { "userData" } else { "password" };
        assert!(stored.properties[digest].as_str().unwrap().starts_with("sha256:"));
    }

    // The runtime itself still receives the clear value.
    let composed = TopologyComposer::from_stack_file(&stack).compose().await.unwrap();
    Reconciler::new(Arc::new(runtime.clone()))
        .apply(&composed.stack, &composed.graph)
        .await
        .unwrap();
    let applied = runtime.applied_properties("assessment-application-database").unwrap();
    assert_eq!(applied["password"], PASSWORD);
}
