//! Cloud lookups: availability zones, certificates, hosted zones.

use std::collections::BTreeMap;

use async_trait::async_trait;
use forge_net::ZoneId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{IacError, IacResult};

/// Read-only discovery of provider state the topology depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudLookup: Send + Sync {
    /// Zones currently available in `region`, in provider order.
    async fn availability_zones(&self, region: &str) -> IacResult<Vec<ZoneId>>;

    /// ARN of the issued certificate for `domain`.
    async fn certificate_arn(&self, domain: &str) -> IacResult<String>;

    /// Hosted zone id serving `domain`.
    async fn hosted_zone_id(&self, domain: &str) -> IacResult<String>;
}

/// Lookup answers recorded in a stack file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LookupData {
    pub zones: Vec<String>,
    pub certificates: BTreeMap<String, String>,
    pub hosted_zones: BTreeMap<String, String>,
}

/// [`CloudLookup`] answering from [`LookupData`].
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    data: LookupData,
}

impl StaticLookup {
    pub fn new(data: LookupData) -> Self {
        Self { data }
    }

    pub fn with_zones<I, S>(mut self, zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data.zones = zones.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_certificate(mut self, domain: impl Into<String>, arn: impl Into<String>) -> Self {
        self.data.certificates.insert(domain.into(), arn.into());
        self
    }

    pub fn with_hosted_zone(mut self, domain: impl Into<String>, id: impl Into<String>) -> Self {
        self.data.hosted_zones.insert(domain.into(), id.into());
        self
    }
}

#[async_trait]
impl CloudLookup for StaticLookup {
    async fn availability_zones(&self, region: &str) -> IacResult<Vec<ZoneId>> {
        debug!("{} static zones for {}", self.data.zones.len(), region);
        Ok(self.data.zones.iter().map(|z| ZoneId::new(z.as_str())).collect())
    }

    async fn certificate_arn(&self, domain: &str) -> IacResult<String> {
        self.data
            .certificates
            .get(domain)
            .cloned()
            .ok_or_else(|| IacError::ExternalLookup(format!("no issued certificate for {}", domain)))
    }

    async fn hosted_zone_id(&self, domain: &str) -> IacResult<String> {
        self.data
            .hosted_zones
            .get(domain)
            .cloned()
            .ok_or_else(|| IacError::ExternalLookup(format!("no hosted zone for {}", domain)))
    }
}
