//! Cloud provider definitions and topology feature sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{IacError, IacResult};

/// Cloud providers a topology declares resources on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Gcp => "gcp",
        }
    }

    pub fn all() -> Vec<Self> {
        vec![CloudProvider::Aws, CloudProvider::Gcp]
    }

    /// Default region for the provider.
    pub fn default_region(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "us-east-1",
            CloudProvider::Gcp => "us-central1",
        }
    }

    /// Resource type token, e.g. `aws:ec2/vpc:Vpc`.
    pub fn type_token(&self, module: &str, kind: &str) -> String {
        format!("{}:{}:{}", self.as_str(), module, kind)
    }
}

impl FromStr for CloudProvider {
    type Err = IacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" => Ok(CloudProvider::Aws),
            "gcp" => Ok(CloudProvider::Gcp),
            other => Err(IacError::Configuration(format!("unknown cloud provider '{}'", other))),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tiers to declare on top of the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TopologyFeatures {
    pub database: bool,
    pub load_balancer: bool,
    pub autoscaling: bool,
    pub eventing: bool,
}

impl Default for TopologyFeatures {
    fn default() -> Self {
        Self::all()
    }
}

impl TopologyFeatures {
    /// Every tier: database, load-balanced fleet, eventing.
    pub fn all() -> Self {
        Self {
            database: true,
            load_balancer: true,
            autoscaling: true,
            eventing: true,
        }
    }

    /// Network plus a single application instance.
    pub fn minimal() -> Self {
        Self {
            database: false,
            load_balancer: false,
            autoscaling: false,
            eventing: false,
        }
    }

    /// Single instance with a database, reachable directly.
    pub fn single_instance() -> Self {
        Self {
            database: true,
            load_balancer: false,
            autoscaling: false,
            eventing: false,
        }
    }

    /// Load-balanced fleet with a database, no eventing.
    pub fn web() -> Self {
        Self {
            database: true,
            load_balancer: true,
            autoscaling: true,
            eventing: false,
        }
    }

    /// Reject contradictory combinations.
    pub fn validate(&self) -> IacResult<()> {
        if self.autoscaling && !self.load_balancer {
            return Err(IacError::Configuration(
                "autoscaling requires a load balancer: a fleet has no single address for DNS"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Providers the selected tiers declare resources on.
    pub fn providers(&self) -> Vec<CloudProvider> {
        if self.eventing {
            CloudProvider::all()
        } else {
            vec![CloudProvider::Aws]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_token() {
        assert_eq!(CloudProvider::Aws.type_token("ec2/vpc", "Vpc"), "aws:ec2/vpc:Vpc");
        assert_eq!(
            CloudProvider::Gcp.type_token("storage/bucket", "Bucket"),
            "gcp:storage/bucket:Bucket"
        );
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("AWS".parse::<CloudProvider>().unwrap(), CloudProvider::Aws);
        assert!("azure".parse::<CloudProvider>().is_err());
    }

    #[test]
    fn test_autoscaling_without_load_balancer_rejected() {
        let features = TopologyFeatures {
            load_balancer: false,
            ..TopologyFeatures::all()
        };
        assert!(matches!(features.validate(), Err(IacError::Configuration(_))));
        assert!(TopologyFeatures::minimal().validate().is_ok());
        assert!(TopologyFeatures::web().validate().is_ok());
    }

    #[test]
    fn test_features_from_yaml() {
        let features: TopologyFeatures =
            serde_yaml::from_str("loadBalancer: false\nautoscaling: false\n").unwrap();
        assert!(features.database);
        assert!(!features.load_balancer);
        assert!(features.eventing);
        assert_eq!(features.providers(), CloudProvider::all());
    }
}
