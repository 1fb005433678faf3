//! Service Registry
//!
//! Static list of verification backends, validated once at load and shared
//! read-only (behind an `Arc`) by every request.

use idfuse_common::models::ServiceDescriptor;
use idfuse_common::{Error, Result};
use reqwest::Url;
use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: Vec<ServiceDescriptor>,
}

impl ServiceRegistry {
    /// Build a registry, rejecting entries the fan-out could not use
    ///
    /// # Errors
    /// - empty or duplicate ids
    /// - endpoints that are not absolute http(s) URLs
    /// - thresholds outside 0.0-1.0
    /// - non-positive timeout overrides
    pub fn new(services: Vec<ServiceDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();

        for service in &services {
            if service.id.trim().is_empty() {
                return Err(Error::Config("Service id must not be empty".to_string()));
            }
            if !seen.insert(service.id.as_str()) {
                return Err(Error::Config(format!("Duplicate service id: {}", service.id)));
            }

            let url = Url::parse(&service.endpoint_url).map_err(|e| {
                Error::Config(format!(
                    "Service {} has invalid endpoint {:?}: {}",
                    service.id, service.endpoint_url, e
                ))
            })?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(Error::Config(format!(
                    "Service {} endpoint must be http or https",
                    service.id
                )));
            }

            if !(0.0..=1.0).contains(&service.threshold) {
                return Err(Error::Config(format!(
                    "Service {} threshold must be within 0.0-1.0, got {}",
                    service.id, service.threshold
                )));
            }

            if let Some(secs) = service.timeout_secs {
                if !(secs.is_finite() && secs > 0.0) {
                    return Err(Error::Config(format!(
                        "Service {} timeout_secs must be positive, got {}",
                        service.id, secs
                    )));
                }
            }
        }

        Ok(Self { services })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Active entries in declaration order
    pub fn active(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter().filter(|s| s.active)
    }

    pub fn active_count(&self) -> usize {
        self.active().count()
    }

    pub fn get(&self, id: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
