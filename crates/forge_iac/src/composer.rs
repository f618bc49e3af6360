//! Topology composer.
//!
//! Declares the whole resource graph for one environment in a single
//! synchronous pass: network, routing, security perimeter, data tier,
//! compute tier, edge tier and eventing tier. Attributes of earlier
//! resources flow into later ones as deferred values, which gives the
//! implicit edges. Explicit edges cover the cases where a consumer only
//! sees the producer through an embedded payload or must wait without a
//! direct reference.

use std::sync::Arc;

use forge_core::{
    PayloadEncoding, ResourceDeclaration, ResourceGraph, ResourceHandle, Value,
};
use forge_net::{plan_subnets, SubnetPlan};
use serde_json::json;
use tracing::{debug, info};

use crate::bootstrap::{application_payload, BootstrapInputs};
use crate::config::{DatabaseSettings, StackConfig, StackFile, TopologySettings};
use crate::error::{IacError, IacResult};
use crate::lookup::{CloudLookup, StaticLookup};
use crate::names::{LogicalName, ResourceNames};
use crate::outputs::{StackReport, APPLICATION_DOMAIN, DATABASE_ENDPOINT, LOAD_BALANCER_DNS};
use crate::provider::{CloudProvider, TopologyFeatures};

const CLOUDWATCH_AGENT_POLICY_ARN: &str = "arn:aws:iam::aws:policy/CloudWatchAgentServerPolicy";
const SNS_FULL_ACCESS_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonSNSFullAccess";
const LAMBDA_BASIC_EXECUTION_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole";
const HTTPS_PORT: u16 = 443;

fn aws(module: &str, kind: &str) -> String {
    CloudProvider::Aws.type_token(module, kind)
}

fn gcp(module: &str, kind: &str) -> String {
    CloudProvider::Gcp.type_token(module, kind)
}

fn assume_role_policy(service: &str) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Action": "sts:AssumeRole",
            "Effect": "Allow",
            "Sid": "",
            "Principal": { "Service": service },
        }],
    })
    .to_string()
}

fn dynamodb_policy_document() -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Action": [
                "dynamodb:GetItem",
                "dynamodb:PutItem",
                "dynamodb:UpdateItem",
                "dynamodb:DeleteItem",
                "dynamodb:Scan",
                "dynamodb:Query",
            ],
            "Resource": ["arn:aws:dynamodb:*:*:table/*"],
        }],
    })
    .to_string()
}

fn ids(handles: &[ResourceHandle]) -> Value {
    Value::list(handles.iter().map(|h| h.output("id")))
}

/// A fully declared stack, ready to plan or reconcile.
#[derive(Debug)]
pub struct ComposedStack {
    pub stack: String,
    pub features: TopologyFeatures,
    pub plan: SubnetPlan,
    pub names: ResourceNames,
    pub graph: ResourceGraph,
}

impl ComposedStack {
    pub fn report(&self) -> StackReport {
        StackReport::new(&self.stack, &self.plan, &self.graph)
    }
}

/// Builds the resource graph for one environment.
pub struct TopologyComposer {
    stack: String,
    features: TopologyFeatures,
    config: StackConfig,
    lookup: Arc<dyn CloudLookup>,
}

impl TopologyComposer {
    pub fn new(
        stack: impl Into<String>,
        features: TopologyFeatures,
        config: StackConfig,
        lookup: Arc<dyn CloudLookup>,
    ) -> Self {
        Self {
            stack: stack.into(),
            features,
            config,
            lookup,
        }
    }

    /// Composer answering lookups from the stack file itself.
    pub fn from_stack_file(stack: &StackFile) -> Self {
        Self::new(
            stack.stack_name(),
            stack.features,
            stack.config.clone(),
            Arc::new(StaticLookup::new(stack.lookup.clone())),
        )
    }

    /// Resolve configuration, run lookups, and declare every resource.
    ///
    /// All configuration and lookup failures surface before the first
    /// declaration.
    pub async fn compose(&self) -> IacResult<ComposedStack> {
        self.features.validate()?;
        let settings = TopologySettings::from_config(&self.config, &self.features)?;
        let names = ResourceNames::resolve(&self.config);

        let zones = self.lookup.availability_zones(&settings.region).await?;
        if zones.is_empty() {
            return Err(IacError::Capacity(format!(
                "no availability zones available in {}",
                settings.region
            )));
        }
        let plan = plan_subnets(&settings.vpc_cidr, settings.subnet_prefix, &zones)?;

        let domain = &settings.application.domain;
        let certificate_arn = if self.features.load_balancer {
            Some(self.lookup.certificate_arn(domain).await?)
        } else {
            None
        };
        let hosted_zone_id = self.lookup.hosted_zone_id(domain).await?;

        let mut composer = Declarations {
            graph: ResourceGraph::new(),
            names: &names,
            settings: &settings,
            features: self.features,
        };
        composer.declare_all(&plan, certificate_arn, hosted_zone_id)?;
        let graph = composer.graph;

        info!(
            "Composed stack {}: {} resources across {} zones",
            self.stack,
            graph.len(),
            plan.subnet_count()
        );
        Ok(ComposedStack {
            stack: self.stack.clone(),
            features: self.features,
            plan,
            names,
            graph,
        })
    }
}

struct Network {
    vpc: ResourceHandle,
    public_subnets: Vec<ResourceHandle>,
    private_subnets: Vec<ResourceHandle>,
}

struct Perimeter {
    application: ResourceHandle,
    load_balancer: Option<ResourceHandle>,
    database: Option<ResourceHandle>,
}

struct Compute {
    /// Present without autoscaling.
    instance: Option<ResourceHandle>,
    target_group: Option<ResourceHandle>,
}

struct Declarations<'a> {
    graph: ResourceGraph,
    names: &'a ResourceNames,
    settings: &'a TopologySettings,
    features: TopologyFeatures,
}

impl<'a> Declarations<'a> {
    fn declare(&mut self, declaration: ResourceDeclaration) -> IacResult<ResourceHandle> {
        Ok(self.graph.declare(declaration)?)
    }

    fn declare_all(
        &mut self,
        plan: &SubnetPlan,
        certificate_arn: Option<String>,
        hosted_zone_id: String,
    ) -> IacResult<()> {
        let network = self.network(plan)?;
        self.routing(&network)?;
        let perimeter = self.perimeter(&network)?;

        let database = match self.settings.database.as_ref() {
            Some(db) => Some(self.data_tier(db, &network, &perimeter)?),
            None => None,
        };

        let instance_profile = self.compute_iam()?;
        let topic = if self.features.eventing {
            Some(self.topic()?)
        } else {
            None
        };

        let compute = self.compute(
            &network,
            &perimeter,
            &instance_profile,
            database.as_ref(),
            topic.as_ref(),
        )?;
        let load_balancer =
            self.edge(&network, &perimeter, &compute, certificate_arn, hosted_zone_id)?;

        if let Some(topic) = &topic {
            self.eventing(topic)?;
        }

        if let Some(db) = &database {
            self.graph.export(DATABASE_ENDPOINT, db.output("endpoint"))?;
        }
        if let Some(lb) = &load_balancer {
            self.graph.export(LOAD_BALANCER_DNS, lb.output("dnsName"))?;
        }
        self.graph
            .export(APPLICATION_DOMAIN, self.settings.application.domain.as_str())?;
        Ok(())
    }

    fn network(&mut self, plan: &SubnetPlan) -> IacResult<Network> {
        let names = self.names;
        let vpc_name = names.get(LogicalName::Vpc);
        let vpc = self.declare(
            ResourceDeclaration::new(aws("ec2/vpc", "Vpc"), vpc_name)
                .property("cidrBlock", self.settings.vpc_cidr.to_string())
                .name_tag(vpc_name),
        )?;

        let mut public_subnets = Vec::with_capacity(plan.subnet_count());
        for subnet in plan.public() {
            let name = names.indexed(LogicalName::PublicSubnet, subnet.index);
            public_subnets.push(
                self.declare(
                    ResourceDeclaration::new(aws("ec2/subnet", "Subnet"), name.as_str())
                        .property("vpcId", vpc.output("id"))
                        .property("cidrBlock", subnet.cidr.to_string())
                        .property("availabilityZone", subnet.zone.as_str())
                        .property("mapPublicIpOnLaunch", true)
                        .name_tag(name),
                )?,
            );
        }

        let mut private_subnets = Vec::with_capacity(plan.subnet_count());
        for subnet in plan.private() {
            let name = names.indexed(LogicalName::PrivateSubnet, subnet.index);
            private_subnets.push(
                self.declare(
                    ResourceDeclaration::new(aws("ec2/subnet", "Subnet"), name.as_str())
                        .property("vpcId", vpc.output("id"))
                        .property("cidrBlock", subnet.cidr.to_string())
                        .property("availabilityZone", subnet.zone.as_str())
                        .name_tag(name),
                )?,
            );
        }

        debug!(
            "Declared network with {} public and {} private subnets",
            public_subnets.len(),
            private_subnets.len()
        );
        Ok(Network {
            vpc,
            public_subnets,
            private_subnets,
        })
    }

    fn routing(&mut self, network: &Network) -> IacResult<()> {
        let names = self.names;
        let settings = self.settings;

        let gateway_name = names.get(LogicalName::InternetGateway);
        let gateway = self.declare(
            ResourceDeclaration::new(aws("ec2/internetGateway", "InternetGateway"), gateway_name)
                .property("vpcId", network.vpc.output("id"))
                .name_tag(gateway_name),
        )?;

        let public_table_name = names.get(LogicalName::PublicRouteTable);
        let public_table = self.declare(
            ResourceDeclaration::new(aws("ec2/routeTable", "RouteTable"), public_table_name)
                .property("vpcId", network.vpc.output("id"))
                .name_tag(public_table_name),
        )?;

        self.declare(
            ResourceDeclaration::new(aws("ec2/route", "Route"), names.get(LogicalName::PublicRoute))
                .property("routeTableId", public_table.output("id"))
                .property("destinationCidrBlock", settings.ipv4_cidr.as_str())
                .property("gatewayId", gateway.output("id")),
        )?;

        let private_table_name = names.get(LogicalName::PrivateRouteTable);
        let private_table = self.declare(
            ResourceDeclaration::new(aws("ec2/routeTable", "RouteTable"), private_table_name)
                .property("vpcId", network.vpc.output("id"))
                .name_tag(private_table_name),
        )?;

        let associations = [
            (LogicalName::PublicRouteTableAssociation, &network.public_subnets, &public_table),
            (LogicalName::PrivateRouteTableAssociation, &network.private_subnets, &private_table),
        ];
        for (logical, subnets, table) in associations {
            for (i, subnet) in subnets.iter().enumerate() {
                self.declare(
                    ResourceDeclaration::new(
                        aws("ec2/routeTableAssociation", "RouteTableAssociation"),
                        names.indexed(logical, i),
                    )
                    .property("subnetId", subnet.output("id"))
                    .property("routeTableId", table.output("id")),
                )?;
            }
        }
        Ok(())
    }

    fn perimeter(&mut self, network: &Network) -> IacResult<Perimeter> {
        let names = self.names;
        let settings = self.settings;
        let app_port = settings.application.port;

        let load_balancer = match &settings.load_balancer {
            Some(lb) => {
                let ingress: Vec<Value> = lb
                    .ports
                    .iter()
                    .map(|port| {
                        Value::map([
                            ("description", Value::from(format!("TLS from VPC for port {}", port))),
                            ("fromPort", Value::from(*port)),
                            ("toPort", Value::from(*port)),
                            ("protocol", Value::from("tcp")),
                            ("cidrBlocks", Value::list([settings.ipv4_cidr.as_str()])),
                            ("ipv6CidrBlocks", Value::list([settings.ipv6_cidr.as_str()])),
                        ])
                    })
                    .collect();
                let name = names.get(LogicalName::LoadBalancerSecurityGroup);
                Some(self.declare(
                    ResourceDeclaration::new(aws("ec2/securityGroup", "SecurityGroup"), name)
                        .property("vpcId", network.vpc.output("id"))
                        .property("ingress", ingress)
                        .name_tag(name),
                )?)
            }
            None => None,
        };

        // Behind a load balancer the application only admits the balancer.
        let ingress: Vec<Value> = settings
            .ports
            .iter()
            .map(|port| {
                let source = match &load_balancer {
                    Some(lb_sg) => ("securityGroups", Value::list([lb_sg.output("id")])),
                    None => ("cidrBlocks", Value::list([settings.ipv4_cidr.as_str()])),
                };
                let mut rule = vec![
                    ("description", Value::from(format!("TLS from VPC for port {}", port))),
                    ("fromPort", Value::from(*port)),
                    ("toPort", Value::from(*port)),
                    ("protocol", Value::from("tcp")),
                    source,
                ];
                if load_balancer.is_none() {
                    rule.push(("ipv6CidrBlocks", Value::list([settings.ipv6_cidr.as_str()])));
                }
                Value::map(rule)
            })
            .collect();
        let app_name = names.get(LogicalName::ApplicationSecurityGroup);
        let application = self.declare(
            ResourceDeclaration::new(aws("ec2/securityGroup", "SecurityGroup"), app_name)
                .property("vpcId", network.vpc.output("id"))
                .property("ingress", ingress)
                .name_tag(app_name),
        )?;

        let database = match &settings.database {
            Some(db) => {
                let name = names.get(LogicalName::DatabaseSecurityGroup);
                let db_sg = self.declare(
                    ResourceDeclaration::new(aws("ec2/securityGroup", "SecurityGroup"), name)
                        .property("vpcId", network.vpc.output("id"))
                        .property(
                            "ingress",
                            Value::list([Value::map([
                                ("securityGroups", Value::list([application.output("id")])),
                                ("protocol", Value::from("tcp")),
                                ("fromPort", Value::from(db.port)),
                                ("toPort", Value::from(db.port)),
                            ])]),
                        )
                        .name_tag(name),
                )?;
                self.declare(
                    ResourceDeclaration::new(
                        aws("ec2/securityGroupRule", "SecurityGroupRule"),
                        names.get(LogicalName::ApplicationDatabaseEgress),
                    )
                    .property("type", "egress")
                    .property("fromPort", db.port)
                    .property("toPort", db.port)
                    .property("protocol", "tcp")
                    .property("securityGroupId", application.output("id"))
                    .property("sourceSecurityGroupId", db_sg.output("id")),
                )?;
                Some(db_sg)
            }
            None => None,
        };

        self.declare(
            ResourceDeclaration::new(
                aws("ec2/securityGroupRule", "SecurityGroupRule"),
                names.get(LogicalName::ApplicationCloudwatchEgress),
            )
            .property("type", "egress")
            .property("fromPort", HTTPS_PORT)
            .property("toPort", HTTPS_PORT)
            .property("protocol", "tcp")
            .property("securityGroupId", application.output("id"))
            .property("cidrBlocks", Value::list([settings.ipv4_cidr.as_str()]))
            .property("ipv6CidrBlocks", Value::list([settings.ipv6_cidr.as_str()])),
        )?;

        if let Some(lb_sg) = &load_balancer {
            self.declare(
                ResourceDeclaration::new(
                    aws("ec2/securityGroupRule", "SecurityGroupRule"),
                    names.get(LogicalName::LoadBalancerEgress),
                )
                .property("type", "egress")
                .property("fromPort", app_port)
                .property("toPort", app_port)
                .property("protocol", "tcp")
                .property("securityGroupId", lb_sg.output("id"))
                .property("sourceSecurityGroupId", application.output("id")),
            )?;
        }

        Ok(Perimeter {
            application,
            load_balancer,
            database,
        })
    }

    fn data_tier(
        &mut self,
        db: &DatabaseSettings,
        network: &Network,
        perimeter: &Perimeter,
    ) -> IacResult<ResourceHandle> {
        let names = self.names;
        let db_sg = perimeter.database.as_ref().ok_or_else(|| {
            IacError::Configuration("database tier requires a database security group".to_string())
        })?;

        let subnet_group_name = names.get(LogicalName::DatabaseSubnetGroup);
        let subnet_group = self.declare(
            ResourceDeclaration::new(aws("rds/subnetGroup", "SubnetGroup"), subnet_group_name)
                .property("subnetIds", ids(&network.private_subnets))
                .name_tag(subnet_group_name),
        )?;

        let parameter_group_name = names.get(LogicalName::DatabaseParameterGroup);
        let parameter_group = self.declare(
            ResourceDeclaration::new(aws("rds/parameterGroup", "ParameterGroup"), parameter_group_name)
                .property("family", db.family.as_str())
                .name_tag(parameter_group_name),
        )?;

        let instance_name = names.get(LogicalName::DatabaseInstance);
        let instance = self.declare(
            ResourceDeclaration::new(aws("rds/instance", "Instance"), instance_name)
                .property("allocatedStorage", db.storage_size)
                .property("engine", db.engine.as_str())
                .property("engineVersion", db.engine_version.as_str())
                .property("instanceClass", db.instance_class.as_str())
                .property("dbName", db.name.as_str())
                .property("username", db.master_user.as_str())
                .property("password", Value::secret(db.master_password.as_str()))
                .property("port", db.port)
                .property("multiAz", false)
                .property("publiclyAccessible", false)
                .property("dbSubnetGroupName", subnet_group.output("name"))
                .property("parameterGroupName", parameter_group.output("name"))
                .property("vpcSecurityGroupIds", Value::list([db_sg.output("id")]))
                .property("skipFinalSnapshot", true)
                .name_tag(instance_name),
        )?;
        Ok(instance)
    }

    /// Role and instance profile the application runs under.
    fn compute_iam(&mut self) -> IacResult<ResourceHandle> {
        let names = self.names;

        let role_name = names.get(LogicalName::CloudwatchAgentRole);
        let role = self.declare(
            ResourceDeclaration::new(aws("iam/role", "Role"), role_name)
                .property("assumeRolePolicy", assume_role_policy("ec2.amazonaws.com"))
                .name_tag(role_name),
        )?;

        let profile_name = names.get(LogicalName::CloudwatchInstanceProfile);
        let profile = self.declare(
            ResourceDeclaration::new(aws("iam/instanceProfile", "InstanceProfile"), profile_name)
                .property("role", role.output("name"))
                .name_tag(profile_name),
        )?;

        self.declare(
            ResourceDeclaration::new(
                aws("iam/rolePolicyAttachment", "RolePolicyAttachment"),
                names.get(LogicalName::CloudwatchAgentPolicy),
            )
            .property("role", role.output("name"))
            .property("policyArn", CLOUDWATCH_AGENT_POLICY_ARN),
        )?;

        if self.features.eventing {
            self.declare(
                ResourceDeclaration::new(
                    aws("iam/rolePolicyAttachment", "RolePolicyAttachment"),
                    names.get(LogicalName::SnsPolicyAttachment),
                )
                .property("role", role.output("name"))
                .property("policyArn", SNS_FULL_ACCESS_POLICY_ARN),
            )?;
        }
        Ok(profile)
    }

    fn topic(&mut self) -> IacResult<ResourceHandle> {
        let name = self.names.get(LogicalName::Topic);
        self.declare(ResourceDeclaration::new(aws("sns/topic", "Topic"), name).name_tag(name))
    }

    fn compute(
        &mut self,
        network: &Network,
        perimeter: &Perimeter,
        instance_profile: &ResourceHandle,
        database: Option<&ResourceHandle>,
        topic: Option<&ResourceHandle>,
    ) -> IacResult<Compute> {
        let names = self.names;
        let settings = self.settings;
        let app = &settings.application;

        let payload = application_payload(
            settings,
            BootstrapInputs {
                database_host: database.map(|db| db.output("address")),
                topic_arn: topic.map(|t| t.output("arn")),
            },
        )?;

        let target_group = match &settings.load_balancer {
            Some(lb) => {
                let name = names.get(LogicalName::TargetGroup);
                Some(self.declare(
                    ResourceDeclaration::new(aws("alb/targetGroup", "TargetGroup"), name)
                        .property("port", app.port)
                        .property("protocol", "HTTP")
                        .property("targetType", "instance")
                        .property("vpcId", network.vpc.output("id"))
                        .property(
                            "healthCheck",
                            Value::map([
                                ("enabled", Value::from(true)),
                                ("interval", Value::from(60)),
                                ("path", Value::from(lb.health_check_path.as_str())),
                                ("port", Value::from(app.port.to_string())),
                                ("protocol", Value::from("HTTP")),
                                ("timeout", Value::from(5)),
                            ]),
                        )
                        .name_tag(name),
                )?)
            }
            None => None,
        };

        let Some(scaling) = &settings.scaling else {
            // Single instance in the first public subnet.
            let first_subnet = network.public_subnets.first().ok_or_else(|| {
                IacError::Capacity("no public subnet for the application instance".to_string())
            })?;
            let name = names.get(LogicalName::ApplicationInstance);
            let mut declaration = ResourceDeclaration::new(aws("ec2/instance", "Instance"), name)
                .property("ami", settings.ami_id.as_str())
                .property("instanceType", settings.instance_type.as_str())
                .property("keyName", settings.ssh_key_name.as_str())
                .property("subnetId", first_subnet.output("id"))
                .property("vpcSecurityGroupIds", Value::list([perimeter.application.output("id")]))
                .property("iamInstanceProfile", instance_profile.output("name"))
                .property("userData", Value::payload(payload, PayloadEncoding::Plain))
                .name_tag(name);
            for producer in database.into_iter().chain(topic) {
                declaration = declaration.depends_on(producer.id());
            }
            let instance = self.declare(declaration)?;

            if let Some(tg) = &target_group {
                self.declare(
                    ResourceDeclaration::new(
                        aws("alb/targetGroupAttachment", "TargetGroupAttachment"),
                        format!("{}-attachment", names.get(LogicalName::TargetGroup)),
                    )
                    .property("targetGroupArn", tg.output("arn"))
                    .property("targetId", instance.output("id"))
                    .property("port", app.port),
                )?;
            }
            return Ok(Compute {
                instance: Some(instance),
                target_group,
            });
        };

        let target_group_handle = target_group.as_ref().ok_or_else(|| {
            IacError::Configuration("autoscaling requires a load balancer".to_string())
        })?;

        let template_name = names.get(LogicalName::LaunchTemplate);
        let mut declaration =
            ResourceDeclaration::new(aws("ec2/launchTemplate", "LaunchTemplate"), template_name)
                .property("name", template_name)
                .property("imageId", settings.ami_id.as_str())
                .property("instanceType", settings.instance_type.as_str())
                .property("keyName", settings.ssh_key_name.as_str())
                .property("disableApiTermination", false)
                .property("vpcSecurityGroupIds", Value::list([perimeter.application.output("id")]))
                .property("userData", Value::payload(payload, PayloadEncoding::Base64))
                .property(
                    "iamInstanceProfile",
                    Value::map([("name", instance_profile.output("name"))]),
                )
                .name_tag(template_name);
        for producer in database.into_iter().chain(topic) {
            declaration = declaration.depends_on(producer.id());
        }
        let launch_template = self.declare(declaration)?;

        let group_name = names.get(LogicalName::AutoScalingGroup);
        let group = self.declare(
            ResourceDeclaration::new(aws("autoscaling/group", "Group"), group_name)
                .property("name", group_name)
                .property("vpcZoneIdentifiers", ids(&network.public_subnets))
                .property("desiredCapacity", scaling.desired_capacity)
                .property("maxSize", scaling.max_size)
                .property("minSize", scaling.min_size)
                .property("defaultCooldown", scaling.cooldown)
                .property("healthCheckType", "ELB")
                .property("healthCheckGracePeriod", 10)
                .property(
                    "launchTemplate",
                    Value::map([
                        ("id", Value::from(launch_template.output("id"))),
                        ("version", Value::from("$Latest")),
                    ]),
                )
                .property(
                    "tags",
                    Value::list([Value::map([
                        ("key", Value::from("Name")),
                        ("value", Value::from(names.get(LogicalName::ApplicationInstance))),
                        ("propagateAtLaunch", Value::from(true)),
                    ])]),
                )
                .property("targetGroupArns", Value::list([target_group_handle.output("arn")])),
        )?;

        let policies = [
            (LogicalName::ScaleUpPolicy, 1i64),
            (LogicalName::ScaleDownPolicy, -1i64),
        ];
        let mut policy_handles = Vec::with_capacity(policies.len());
        for (logical, adjustment) in policies {
            policy_handles.push(self.declare(
                ResourceDeclaration::new(aws("autoscaling/policy", "Policy"), names.get(logical))
                    .property("adjustmentType", "ChangeInCapacity")
                    .property("scalingAdjustment", adjustment)
                    .property("metricAggregationType", "Average")
                    .property("policyType", "SimpleScaling")
                    .property("autoscalingGroupName", group.output("name")),
            )?);
        }

        let alarms = [
            (LogicalName::ScaleUpAlarm, scaling.scale_up_threshold, "GreaterThanThreshold"),
            (LogicalName::ScaleDownAlarm, scaling.scale_down_threshold, "LessThanThreshold"),
        ];
        for ((logical, threshold, comparison), policy) in alarms.into_iter().zip(&policy_handles) {
            self.declare(
                ResourceDeclaration::new(aws("cloudwatch/metricAlarm", "MetricAlarm"), names.get(logical))
                    .property("alarmDescription", "Request for the AutoScaling Alarm")
                    .property("evaluationPeriods", 2)
                    .property("metricName", "CPUUtilization")
                    .property("namespace", "AWS/EC2")
                    .property("period", 120)
                    .property("statistic", "Average")
                    .property("threshold", threshold as f64)
                    .property("comparisonOperator", comparison)
                    .property(
                        "dimensions",
                        Value::map([("AutoScalingGroupName", group.output("name"))]),
                    )
                    .property("alarmActions", Value::list([policy.output("arn")])),
            )?;
        }

        Ok(Compute {
            instance: None,
            target_group,
        })
    }

    /// Load balancer, listener and DNS record. Returns the load balancer.
    fn edge(
        &mut self,
        network: &Network,
        perimeter: &Perimeter,
        compute: &Compute,
        certificate_arn: Option<String>,
        hosted_zone_id: String,
    ) -> IacResult<Option<ResourceHandle>> {
        let names = self.names;
        let settings = self.settings;
        let domain = settings.application.domain.as_str();
        let record_name = names.get(LogicalName::ApplicationRecord);

        let (Some(lb_sg), Some(target_group)) = (&perimeter.load_balancer, &compute.target_group)
        else {
            // Plain A record at the single instance.
            let instance = compute.instance.as_ref().ok_or_else(|| {
                IacError::Configuration(
                    "a DNS record without a load balancer needs a single instance".to_string(),
                )
            })?;
            self.declare(
                ResourceDeclaration::new(aws("route53/record", "Record"), record_name)
                    .property("name", domain)
                    .property("type", "A")
                    .property("zoneId", hosted_zone_id)
                    .property("ttl", 300)
                    .property("records", Value::list([instance.output("publicIp")]))
                    .property("allowOverwrite", true),
            )?;
            return Ok(None);
        };

        let certificate_arn = certificate_arn.ok_or_else(|| {
            IacError::ExternalLookup(format!("no certificate resolved for {}", domain))
        })?;

        let lb_name = names.get(LogicalName::LoadBalancer);
        let load_balancer = self.declare(
            ResourceDeclaration::new(aws("lb/loadBalancer", "LoadBalancer"), lb_name)
                .property("internal", false)
                .property("loadBalancerType", "application")
                .property("subnets", ids(&network.public_subnets))
                .property("securityGroups", Value::list([lb_sg.output("id")]))
                .property("enableDeletionProtection", false)
                .name_tag(lb_name),
        )?;

        let listener_name = names.get(LogicalName::Listener);
        self.declare(
            ResourceDeclaration::new(aws("alb/listener", "Listener"), listener_name)
                .property(
                    "defaultActions",
                    Value::list([Value::map([
                        ("type", Value::from("forward")),
                        ("targetGroupArn", Value::from(target_group.output("arn"))),
                    ])]),
                )
                .property("loadBalancerArn", load_balancer.output("arn"))
                .property("certificateArn", certificate_arn)
                .property("port", HTTPS_PORT)
                .property("protocol", "HTTPS")
                .name_tag(listener_name)
                .depends_on(load_balancer.id()),
        )?;

        self.declare(
            ResourceDeclaration::new(aws("route53/record", "Record"), record_name)
                .property("name", domain)
                .property("type", "A")
                .property("zoneId", hosted_zone_id)
                .property(
                    "aliases",
                    Value::list([Value::map([
                        ("evaluateTargetHealth", Value::from(true)),
                        ("name", Value::from(load_balancer.output("dnsName"))),
                        ("zoneId", Value::from(load_balancer.output("zoneId"))),
                    ])]),
                )
                .property("allowOverwrite", true)
                .depends_on(load_balancer.id()),
        )?;

        Ok(Some(load_balancer))
    }

    /// Submission table, GCP bucket and credentials, and the notification
    /// function subscribed to the topic.
    fn eventing(&mut self, topic: &ResourceHandle) -> IacResult<()> {
        let names = self.names;
        let settings = self.settings;
        let eventing = settings.eventing.as_ref().ok_or_else(|| {
            IacError::Configuration("eventing tier requires eventing settings".to_string())
        })?;

        let table_name = names.get(LogicalName::SubmissionTable);
        let table = self.declare(
            ResourceDeclaration::new(aws("dynamodb/table", "Table"), table_name)
                .property("name", table_name)
                .property(
                    "attributes",
                    Value::list([Value::map([("name", "Id"), ("type", "S")])]),
                )
                .property("hashKey", "Id")
                .property("readCapacity", 5)
                .property("writeCapacity", 5),
        )?;

        let bucket_name = names.get(LogicalName::Bucket);
        let bucket = self.declare(
            ResourceDeclaration::new(gcp("storage/bucket", "Bucket"), bucket_name)
                .property("location", "US")
                .property("name", bucket_name)
                .property("project", eventing.gcp_project.as_str())
                .property("storageClass", "STANDARD")
                .property("publicAccessPrevention", "enforced"),
        )?;

        let account_name = names.get(LogicalName::ServiceAccount);
        let account = self.declare(
            ResourceDeclaration::new(gcp("serviceaccount/account", "Account"), account_name)
                .property("accountId", names.get(LogicalName::ServiceAccountId))
                .property("displayName", account_name)
                .property("project", eventing.gcp_project.as_str()),
        )?;

        let key = self.declare(
            ResourceDeclaration::new(
                gcp("serviceaccount/key", "Key"),
                names.get(LogicalName::ServiceAccountKey),
            )
            .property("serviceAccountId", account.output("name"))
            .property("publicKeyType", "TYPE_X509_PEM_FILE"),
        )?;

        self.declare(
            ResourceDeclaration::new(
                gcp("storage/bucketIAMMember", "BucketIAMMember"),
                names.get(LogicalName::BucketBinding),
            )
            .property("bucket", bucket.output("name"))
            .property("role", "roles/storage.admin")
            .property("member", account.output("member")),
        )?;

        let role = self.declare(
            ResourceDeclaration::new(aws("iam/role", "Role"), names.get(LogicalName::LambdaRole))
                .property("assumeRolePolicy", assume_role_policy("lambda.amazonaws.com")),
        )?;

        self.declare(
            ResourceDeclaration::new(
                aws("iam/rolePolicyAttachment", "RolePolicyAttachment"),
                names.get(LogicalName::LambdaRolePolicyAttachment),
            )
            .property("role", role.output("name"))
            .property("policyArn", LAMBDA_BASIC_EXECUTION_POLICY_ARN),
        )?;

        let policy = self.declare(
            ResourceDeclaration::new(aws("iam/policy", "Policy"), names.get(LogicalName::DynamoDbPolicy))
                .property("path", "/")
                .property("description", "IAM policy for dynamodb")
                .property("policy", dynamodb_policy_document()),
        )?;

        self.declare(
            ResourceDeclaration::new(
                aws("iam/rolePolicyAttachment", "RolePolicyAttachment"),
                names.get(LogicalName::DynamoDbPolicyAttachment),
            )
            .property("role", role.output("name"))
            .property("policyArn", policy.output("arn"))
            .depends_on(role.id())
            .depends_on(policy.id()),
        )?;

        let function = self.declare(
            ResourceDeclaration::new(aws("lambda/function", "Function"), names.get(LogicalName::LambdaFunction))
                .property("code", Value::map([("archive", eventing.archive_path.as_str())]))
                .property("handler", "lambda.lambda_handler")
                .property("runtime", "python3.11")
                .property("role", role.output("arn"))
                .property("timeout", 15)
                .property(
                    "environment",
                    Value::map([(
                        "variables",
                        Value::map([
                            ("GOOGLE_CREDENTIALS", Value::from(key.output("privateKey"))),
                            (
                                "FROM_ADDRESS",
                                Value::from(format!("mailgun@{}", settings.application.domain)),
                            ),
                            ("GCP_BUCKET_NAME", Value::from(bucket.output("name"))),
                            ("DYNAMO_TABLE_NAME", Value::from(table.output("name"))),
                        ]),
                    )]),
                ),
        )?;

        let permission = self.declare(
            ResourceDeclaration::new(
                aws("lambda/permission", "Permission"),
                names.get(LogicalName::LambdaPermission),
            )
            .property("action", "lambda:InvokeFunction")
            .property("function", function.output("name"))
            .property("principal", "sns.amazonaws.com")
            .property("sourceArn", topic.output("arn")),
        )?;

        self.declare(
            ResourceDeclaration::new(
                aws("sns/topicSubscription", "TopicSubscription"),
                names.get(LogicalName::LambdaSubscription),
            )
            .property("topic", topic.output("arn"))
            .property("protocol", "lambda")
            .property("endpoint", function.output("arn"))
            .depends_on(permission.id()),
        )?;
        Ok(())
    }
}
