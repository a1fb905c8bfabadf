use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::identity::IdentityRegistry;
use crate::persistence::CustomerStore;

// ============================================================================
// Health Reporting
// ============================================================================
//
// Components:
// - customer_store:    unreachable store makes the service Unhealthy
// - identity_registry: unreachable registry only blocks registration, so
//                      the service is Degraded (login keeps working)
//
// ============================================================================

/// Health status of a component
#[derive(Debug, Clone, PartialEq)]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    fn label(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded(_) => "degraded",
            HealthStatus::Unhealthy(_) => "unhealthy",
        }
    }

    fn detail(&self) -> Option<&str> {
        match self {
            HealthStatus::Healthy => None,
            HealthStatus::Degraded(msg) | HealthStatus::Unhealthy(msg) => Some(msg),
        }
    }
}

impl Serialize for HealthStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn new(name: &'static str, status: HealthStatus) -> Self {
        let details = status.detail().map(str::to_string);
        Self {
            name,
            status,
            details,
            last_check: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

pub fn compute_overall_status(components: &[ComponentHealth]) -> HealthStatus {
    let mut has_degraded = false;
    let mut unhealthy_components = Vec::new();

    for health in components {
        match &health.status {
            HealthStatus::Unhealthy(msg) => unhealthy_components.push(format!("{}: {}", health.name, msg)),
            HealthStatus::Degraded(_) => has_degraded = true,
            HealthStatus::Healthy => {}
        }
    }

    if !unhealthy_components.is_empty() {
        HealthStatus::Unhealthy(unhealthy_components.join(", "))
    } else if has_degraded {
        HealthStatus::Degraded("Some components degraded".to_string())
    } else {
        HealthStatus::Healthy
    }
}

pub struct HealthChecker {
    store: Arc<dyn CustomerStore>,
    registry: Arc<dyn IdentityRegistry>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn CustomerStore>, registry: Arc<dyn IdentityRegistry>) -> Self {
        Self { store, registry }
    }

    pub async fn check(&self) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                tracing::warn!(error = %e, "Customer store health check failed");
                HealthStatus::Unhealthy(format!("store unreachable: {e}"))
            }
        };

        let registry = if self.registry.is_healthy().await {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded("identity registry unavailable, registration paused".to_string())
        };

        let components = vec![
            ComponentHealth::new("customer_store", store),
            ComponentHealth::new("identity_registry", registry),
        ];
        HealthReport {
            status: compute_overall_status(&components),
            components,
        }
    }
}
