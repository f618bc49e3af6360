//! Stack configuration.
//!
//! A stack file names the project and environment, selects topology
//! features, and carries a flat `namespace:key` configuration map. Keys
//! without a namespace belong to the project (`vpcCidr`, `vpcName`).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use forge_net::{AddressBlock, DEFAULT_SUBNET_PREFIX};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IacError, IacResult};
use crate::lookup::LookupData;
use crate::provider::{CloudProvider, TopologyFeatures};

/// A configuration value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<ConfigValue>),
}

impl ConfigValue {
    /// Scalar rendered as text. Lists have no text form.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ConfigValue::Bool(b) => Some(b.to_string()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Float(f) => Some(f.to_string()),
            ConfigValue::String(s) => Some(s.clone()),
            ConfigValue::List(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::String(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::String(s)
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Int(i)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Bool(b)
    }
}

impl From<Vec<i64>> for ConfigValue {
    fn from(items: Vec<i64>) -> Self {
        ConfigValue::List(items.into_iter().map(ConfigValue::Int).collect())
    }
}

/// Read-only key/value configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackConfig {
    values: BTreeMap<String, ConfigValue>,
}

impl StackConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn raw(&self, key: &str) -> Option<&ConfigValue> {
        self.values.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }

    /// Scalar value as text, if set.
    pub fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(ConfigValue::as_text)
    }

    pub fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn require(&self, key: &str) -> IacResult<String> {
        match self.values.get(key) {
            None => Err(IacError::missing(key)),
            Some(value) => value
                .as_text()
                .ok_or_else(|| IacError::malformed(key, "must be a scalar")),
        }
    }

    pub fn require_int(&self, key: &str) -> IacResult<i64> {
        self.values
            .get(key)
            .ok_or_else(|| IacError::missing(key))?
            .as_int()
            .ok_or_else(|| IacError::malformed(key, "must be an integer"))
    }

    /// Integer with a default when unset.
    pub fn get_int_or(&self, key: &str, default: i64) -> IacResult<i64> {
        if self.contains(key) {
            self.require_int(key)
        } else {
            Ok(default)
        }
    }

    pub fn require_port(&self, key: &str) -> IacResult<u16> {
        let value = self.require_int(key)?;
        to_port(key, value)
    }

    pub fn require_int_list(&self, key: &str) -> IacResult<Vec<i64>> {
        match self.values.get(key) {
            None => Err(IacError::missing(key)),
            Some(ConfigValue::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_int()
                        .ok_or_else(|| IacError::malformed(key, "must be a list of integers"))
                })
                .collect(),
            Some(_) => Err(IacError::malformed(key, "must be a list")),
        }
    }

    pub fn require_port_list(&self, key: &str) -> IacResult<Vec<u16>> {
        self.require_int_list(key)?
            .into_iter()
            .map(|value| to_port(key, value))
            .collect()
    }
}

fn to_port(key: &str, value: i64) -> IacResult<u16> {
    u16::try_from(value)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| IacError::malformed(key, format!("has invalid port {}", value)))
}

/// A stack file: one deployable environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackFile {
    pub project: String,
    pub environment: String,
    #[serde(default)]
    pub features: TopologyFeatures,
    #[serde(default)]
    pub config: StackConfig,
    #[serde(default)]
    pub lookup: LookupData,
}

impl StackFile {
    /// Default file name for an environment.
    pub fn default_path(environment: &str) -> PathBuf {
        PathBuf::from(format!("Forge.{}.yaml", environment))
    }

    /// Load a stack file from YAML.
    pub fn from_file(path: &Path) -> IacResult<Self> {
        let content = fs::read_to_string(path)?;
        let stack = Self::from_yaml(&content)?;
        debug!("Loaded stack {} from {:?}", stack.stack_name(), path);
        Ok(stack)
    }

    pub fn from_yaml(content: &str) -> IacResult<Self> {
        let stack: StackFile = serde_yaml::from_str(content)?;
        if stack.project.trim().is_empty() || stack.environment.trim().is_empty() {
            return Err(IacError::Configuration(
                "stack file needs a project and an environment".to_string(),
            ));
        }
        Ok(stack)
    }

    /// Save the stack file as YAML.
    pub fn to_file(&self, path: &Path) -> IacResult<()> {
        fs::write(path, serde_yaml::to_string(self)?)?;
        Ok(())
    }

    /// `<project>-<environment>`.
    pub fn stack_name(&self) -> String {
        format!("{}-{}", self.project, self.environment)
    }
}

/// Application settings shared by every compute variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationSettings {
    pub user: String,
    pub user_group: String,
    pub port: u16,
    pub resource_file: String,
    pub property_file: String,
    pub log_file: String,
    pub cloudwatch_config_file: String,
    pub binary_file: String,
    /// `<aws:profile>.<application:domainName>`.
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadBalancerSettings {
    pub ports: Vec<u16>,
    pub health_check_path: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseSettings {
    pub family: String,
    pub storage_size: i64,
    pub engine: String,
    pub engine_version: String,
    pub instance_class: String,
    pub name: String,
    pub master_user: String,
    pub master_password: String,
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalingSettings {
    pub min_size: i64,
    pub max_size: i64,
    pub desired_capacity: i64,
    pub cooldown: i64,
    pub scale_up_threshold: i64,
    pub scale_down_threshold: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventingSettings {
    pub gcp_project: String,
    /// Function code archive.
    pub archive_path: String,
}

/// Every value the selected features need, parsed and checked up front.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySettings {
    pub vpc_cidr: AddressBlock,
    pub subnet_prefix: u8,
    pub ipv4_cidr: String,
    pub ipv6_cidr: String,
    pub ssh_key_name: String,
    pub instance_type: String,
    pub ami_id: String,
    pub ports: Vec<u16>,
    pub profile: String,
    pub region: String,
    pub application: ApplicationSettings,
    pub load_balancer: Option<LoadBalancerSettings>,
    pub database: Option<DatabaseSettings>,
    pub scaling: Option<ScalingSettings>,
    pub eventing: Option<EventingSettings>,
}

impl TopologySettings {
    pub fn from_config(config: &StackConfig, features: &TopologyFeatures) -> IacResult<Self> {
        let vpc_cidr_raw = config.require("vpcCidr")?;
        let vpc_cidr: AddressBlock = vpc_cidr_raw
            .parse()
            .map_err(|e| IacError::malformed("vpcCidr", e))?;

        let subnet_prefix = config.get_int_or("subnetPrefix", i64::from(DEFAULT_SUBNET_PREFIX))?;
        let subnet_prefix = u8::try_from(subnet_prefix)
            .map_err(|_| IacError::malformed("subnetPrefix", "must be between 0 and 32"))?;

        let profile = config.require("aws:profile")?;
        let application = ApplicationSettings {
            user: config.require("application:user")?,
            user_group: config.require("application:userGroup")?,
            port: config.require_port("application:port")?,
            resource_file: config.require("application:resourceFile")?,
            property_file: config.require("application:propertyFile")?,
            log_file: config.require("application:logFile")?,
            cloudwatch_config_file: config.require("application:cloudwatchConfigFile")?,
            binary_file: config.require("application:binaryFile")?,
            domain: format!("{}.{}", profile, config.require("application:domainName")?),
        };

        let load_balancer = if features.load_balancer {
            Some(LoadBalancerSettings {
                ports: config.require_port_list("loadBalancerPorts")?,
                health_check_path: config.require("application:healthCheckPath")?,
            })
        } else {
            None
        };

        let database = if features.database {
            Some(DatabaseSettings {
                family: config.require("database:family")?,
                storage_size: config.require_int("database:storageSize")?,
                engine: config.require("database:engine")?,
                engine_version: config.require("database:engineVersion")?,
                instance_class: config.require("database:instanceClass")?,
                name: config.require("database:name")?,
                master_user: config.require("database:masterUser")?,
                master_password: config.require("database:masterPassword")?,
                port: config.require_port("database:port")?,
            })
        } else {
            None
        };

        let scaling = if features.autoscaling {
            let scaling = ScalingSettings {
                min_size: config.get_int_or("autoscaling:minSize", 1)?,
                max_size: config.get_int_or("autoscaling:maxSize", 3)?,
                desired_capacity: config.get_int_or("autoscaling:desiredCapacity", 1)?,
                cooldown: config.get_int_or("autoscaling:cooldown", 60)?,
                scale_up_threshold: config.get_int_or("autoscaling:scaleUpThreshold", 5)?,
                scale_down_threshold: config.get_int_or("autoscaling:scaleDownThreshold", 3)?,
            };
            if scaling.min_size > scaling.desired_capacity
                || scaling.desired_capacity > scaling.max_size
            {
                return Err(IacError::Configuration(format!(
                    "autoscaling sizes must satisfy min <= desired <= max (got {} / {} / {})",
                    scaling.min_size, scaling.desired_capacity, scaling.max_size
                )));
            }
            Some(scaling)
        } else {
            None
        };

        let eventing = if features.eventing {
            Some(EventingSettings {
                gcp_project: config.require("application:gcpProject")?,
                archive_path: config.require("path")?,
            })
        } else {
            None
        };

        Ok(Self {
            vpc_cidr,
            subnet_prefix,
            ipv4_cidr: config.require("ipv4Cidr")?,
            ipv6_cidr: config.require("ipv6Cidr")?,
            ssh_key_name: config.require("sshKeyName")?,
            instance_type: config.require("instanceType")?,
            ami_id: config.require("amiId")?,
            ports: config.require_port_list("ports")?,
            profile,
            region: config.get_or("aws:region", CloudProvider::Aws.default_region()),
            application,
            load_balancer,
            database,
            scaling,
            eventing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> StackConfig {
        StackConfig::new()
            .with("vpcCidr", "10.0.0.0/16")
            .with("ipv4Cidr", "0.0.0.0/0")
            .with("ipv6Cidr", "::/0")
            .with("sshKeyName", "ec2-key")
            .with("instanceType", "t2.micro")
            .with("amiId", "ami-123")
            .with("ports", vec![22i64, 8080])
            .with("aws:profile", "dev")
            .with("application:user", "csye6225")
            .with("application:userGroup", "csye6225")
            .with("application:port", 8080i64)
            .with("application:resourceFile", "/opt/app/submissions")
            .with("application:propertyFile", "/opt/app/application.properties")
            .with("application:logFile", "/var/log/app.log")
            .with("application:cloudwatchConfigFile", "/opt/cloudwatch.json")
            .with("application:binaryFile", "/opt/app/app.jar")
            .with("application:domainName", "example.com")
    }

    #[test]
    fn test_accessors() {
        let config = base_config().with("database:port", "3306");
        assert_eq!(config.require("vpcCidr").unwrap(), "10.0.0.0/16");
        assert_eq!(config.require_int("application:port").unwrap(), 8080);
        assert_eq!(config.require_port("database:port").unwrap(), 3306);
        assert_eq!(config.require_int_list("ports").unwrap(), vec![22, 8080]);
        assert_eq!(config.get_or("aws:region", "us-east-1"), "us-east-1");
        assert!(matches!(config.require("nope"), Err(IacError::Configuration(_))));
        assert!(config.require("ports").is_err());
        assert!(config.require_int_list("vpcCidr").is_err());
    }

    #[test]
    fn test_port_range_checked() {
        let config = StackConfig::new().with("p", 70000i64).with("z", 0i64);
        assert!(config.require_port("p").is_err());
        assert!(config.require_port("z").is_err());
    }

    #[test]
    fn test_settings_minimal_features() {
        let settings =
            TopologySettings::from_config(&base_config(), &TopologyFeatures::minimal()).unwrap();
        assert_eq!(settings.vpc_cidr.to_string(), "10.0.0.0/16");
        assert_eq!(settings.subnet_prefix, DEFAULT_SUBNET_PREFIX);
        assert_eq!(settings.application.domain, "dev.example.com");
        assert_eq!(settings.region, "us-east-1");
        assert!(settings.database.is_none());
        assert!(settings.load_balancer.is_none());
    }

    #[test]
    fn test_settings_missing_feature_key() {
        let err = TopologySettings::from_config(&base_config(), &TopologyFeatures::single_instance())
            .unwrap_err();
        assert!(err.to_string().contains("database:family"));
    }

    #[test]
    fn test_settings_invalid_cidr() {
        let config = base_config().with("vpcCidr", "10.0.0.0");
        let err = TopologySettings::from_config(&config, &TopologyFeatures::minimal()).unwrap_err();
        assert!(matches!(err, IacError::Configuration(_)));
    }

    #[test]
    fn test_stack_file_yaml() {
        let yaml = r#"
project: webapp
environment: dev
features:
  database: false
  loadBalancer: false
  autoscaling: false
  eventing: false
config:
  vpcCidr: 10.0.0.0/16
  database:port: 3306
  ports: [22, 8080]
lookup:
  zones: [us-east-1a, us-east-1b]
"#;
        let stack = StackFile::from_yaml(yaml).unwrap();
        assert_eq!(stack.stack_name(), "webapp-dev");
        assert_eq!(stack.features, TopologyFeatures::minimal());
        assert_eq!(stack.config.require_int("database:port").unwrap(), 3306);
        assert_eq!(stack.config.require_int_list("ports").unwrap(), vec![22, 8080]);
        assert_eq!(stack.lookup.zones.len(), 2);
    }

    #[test]
    fn test_stack_file_requires_project() {
        assert!(StackFile::from_yaml("project: ''\nenvironment: dev\n").is_err());
    }
}
