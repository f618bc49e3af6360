//! Logical resource names.
//!
//! Every provisionable resource has a logical name. The resolved string is
//! both the runtime key of the resource and its `Name` tag. A project-level
//! configuration key overrides the built-in default.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Serialize, Serializer};

use crate::config::StackConfig;

macro_rules! logical_names {
    ($($variant:ident => ($key:literal, $default:literal)),+ $(,)?) => {
        /// A logical resource name.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum LogicalName {
            $($variant),+
        }

        impl LogicalName {
            /// Every logical name, in declaration order.
            pub const ALL: &'static [LogicalName] = &[$(LogicalName::$variant),+];

            /// Configuration key that overrides this name.
            pub fn key(&self) -> &'static str {
                match self {
                    $(LogicalName::$variant => $key),+
                }
            }

            /// Built-in fallback.
            pub fn default_value(&self) -> &'static str {
                match self {
                    $(LogicalName::$variant => $default),+
                }
            }
        }
    };
}

logical_names! {
    Vpc => ("vpcName", "my-vpc"),
    InternetGateway => ("internetGatewayName", "Internet-Gateway"),
    PublicSubnet => ("publicSubnetName", "public-subnet"),
    PrivateSubnet => ("privateSubnetName", "private-subnet"),
    PublicRouteTable => ("publicRouteTableName", "public-route-table"),
    PrivateRouteTable => ("privateRouteTableName", "private-route-table"),
    PublicRoute => ("publicRouteName", "public-route"),
    PublicRouteTableAssociation => ("publicRTAName", "publicRTA"),
    PrivateRouteTableAssociation => ("privateRTAName", "privateRTA"),
    ApplicationSecurityGroup => ("securityGroupName", "application-security-group"),
    DatabaseSecurityGroup => ("databaseSecurityGroupName", "database-security-group"),
    LoadBalancerSecurityGroup => ("loadBalancerSecurityGroupName", "load-balancer-security-group"),
    ApplicationDatabaseEgress => ("applicationDatabaseEgressName", "application-database-egress"),
    ApplicationCloudwatchEgress => ("applicationCloudwatchEgressName", "application-cloudwatch-egress"),
    LoadBalancerEgress => ("loadBalancerEgressName", "loadBalancer-a-egress"),
    DatabaseSubnetGroup => ("databaseSubnetGroupName", "database-subnet-group"),
    DatabaseParameterGroup => ("databaseParameterGroupName", "database-parameter-group"),
    DatabaseInstance => ("databaseInstanceName", "assessment-application-database"),
    ApplicationInstance => ("applicationInstanceName", "assessment-application-instance"),
    CloudwatchAgentRole => ("cloudwatchAgentRoleName", "cloudwatch-agent-role"),
    CloudwatchInstanceProfile => ("cloudwatchInstanceProfileName", "cloudwatch-instance-profile"),
    CloudwatchAgentPolicy => ("cloudwatchAgentPolicyName", "cloudwatch-agent-policy"),
    SnsPolicyAttachment => ("snsPolicyAttachmentName", "SNS-policy"),
    LaunchTemplate => ("ec2LaunchTemplateName", "csye6225_asg"),
    TargetGroup => ("targetGroupName", "target-group"),
    AutoScalingGroup => ("autoScalingGroupName", "auto-scaling-group"),
    ScaleUpPolicy => ("scaleUpPolicyName", "scale-up-policy"),
    ScaleDownPolicy => ("scaleDownPolicyName", "scale-down-policy"),
    ScaleUpAlarm => ("scaleUpAlarmName", "scale-up-alarm"),
    ScaleDownAlarm => ("scaleDownAlarmName", "scale-down-alarm"),
    LoadBalancer => ("loadBalancerName", "load-balancer"),
    Listener => ("listenerName", "listener"),
    ApplicationRecord => ("applicationInstanceRecordName", "application-instance-record"),
    Topic => ("topicName", "assessment-application-topic"),
    SubmissionTable => ("dynamoDBName", "Submission-table"),
    Bucket => ("bucketName", "pranay-bucket-csye6225"),
    ServiceAccount => ("serviceAccountName", "assessment-application-service-account"),
    ServiceAccountId => ("serviceAccountId", "service-account-id"),
    ServiceAccountKey => ("serviceAccountKeyName", "assessment-application-service-account-key"),
    BucketBinding => ("bucketBindingName", "My-Bucket-Binding"),
    LambdaRole => ("lambdaRoleName", "lambdaRole"),
    LambdaRolePolicyAttachment => ("lambdaRolePolicyAttachmentName", "lambdaRolePolicyAttachment"),
    DynamoDbPolicy => ("dynamoDBPolicyName", "dynamodb-policy"),
    DynamoDbPolicyAttachment => ("dynamoDBPolicyAttachmentName", "dynamodb-policy-attachment"),
    LambdaFunction => ("lambdaFunctionName", "assessment-application-lambda"),
    LambdaPermission => ("lambdaFunctionPermissionName", "lambda-function-permission"),
    LambdaSubscription => ("lambdaSubscriptionName", "lambdaSubscription"),
}

impl fmt::Display for LogicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for LogicalName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

/// Resolved name for every logical resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceNames {
    names: BTreeMap<LogicalName, String>,
    #[serde(skip)]
    overridden: BTreeSet<LogicalName>,
}

impl ResourceNames {
    /// Resolve every name from `config`, falling back to defaults.
    pub fn resolve(config: &StackConfig) -> Self {
        let mut names = BTreeMap::new();
        let mut overridden = BTreeSet::new();
        for name in LogicalName::ALL {
            let value = match config.get(name.key()) {
                Some(value) => {
                    overridden.insert(*name);
                    value
                }
                None => name.default_value().to_string(),
            };
            names.insert(*name, value);
        }
        Self { names, overridden }
    }

    /// Resolved name. Every logical name is always present.
    pub fn get(&self, name: LogicalName) -> &str {
        self.names
            .get(&name)
            .map(|s| s.as_str())
            .unwrap_or_else(|| name.default_value())
    }

    /// `"{name}-{index + 1}"`, for per-subnet resources.
    pub fn indexed(&self, name: LogicalName, index: usize) -> String {
        format!("{}-{}", self.get(name), index + 1)
    }

    pub fn is_overridden(&self, name: LogicalName) -> bool {
        self.overridden.contains(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (LogicalName, &str)> {
        self.names.iter().map(|(k, v)| (*k, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_yields_defaults() {
        let names = ResourceNames::resolve(&StackConfig::new());
        assert_eq!(names.len(), LogicalName::ALL.len());
        for name in LogicalName::ALL {
            assert_eq!(names.get(*name), name.default_value());
            assert!(!names.is_overridden(*name));
        }
        assert_eq!(names.get(LogicalName::Vpc), "my-vpc");
        assert_eq!(names.get(LogicalName::LaunchTemplate), "csye6225_asg");
    }

    #[test]
    fn test_single_override() {
        let config = StackConfig::new().with("vpcName", "main-vpc");
        let names = ResourceNames::resolve(&config);
        let defaults = ResourceNames::resolve(&StackConfig::new());

        assert_eq!(names.get(LogicalName::Vpc), "main-vpc");
        assert!(names.is_overridden(LogicalName::Vpc));
        for name in LogicalName::ALL.iter().filter(|n| **n != LogicalName::Vpc) {
            assert_eq!(names.get(*name), defaults.get(*name));
        }
    }

    #[test]
    fn test_indexed_names() {
        let names = ResourceNames::resolve(&StackConfig::new());
        assert_eq!(names.indexed(LogicalName::PublicSubnet, 0), "public-subnet-1");
        assert_eq!(names.indexed(LogicalName::PrivateRouteTableAssociation, 2), "privateRTA-3");
    }

    #[test]
    fn test_keys_unique() {
        let keys: BTreeSet<&str> = LogicalName::ALL.iter().map(|n| n.key()).collect();
        assert_eq!(keys.len(), LogicalName::ALL.len());
    }
}
