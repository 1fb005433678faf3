//! Fan-out Coordinator
//!
//! Runs one verification call per active registry entry, each in its own
//! task, and collects every outcome before a global deadline.
//!
//! # Guarantees
//! - One outcome per active entry, in registry order, whatever happened to
//!   the individual calls.
//! - The total wait is bounded by the longest per-call timeout plus a grace
//!   margin, never by their sum.
//! - Calls still running at the deadline are recorded as `timeout` and
//!   aborted; the coordinator does not wait for them to wind down.

use crate::registry::ServiceRegistry;
use crate::verification::{ImagePayload, VerificationBackend};
use idfuse_common::models::{ServiceDescriptor, ServiceOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinSet};
use tracing::{debug, warn};

/// Default grace margin added to the longest per-call timeout
pub const DEFAULT_FANOUT_GRACE: Duration = Duration::from_millis(500);

pub struct FanoutCoordinator {
    backend: Arc<dyn VerificationBackend>,
    grace: Duration,
}

impl FanoutCoordinator {
    pub fn new(backend: Arc<dyn VerificationBackend>) -> Self {
        Self {
            backend,
            grace: DEFAULT_FANOUT_GRACE,
        }
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Global deadline budget for the given entries
    pub fn deadline_for(&self, services: &[ServiceDescriptor]) -> Duration {
        services
            .iter()
            .map(|s| self.backend.timeout_for(s))
            .max()
            .unwrap_or_default()
            + self.grace
    }

    /// Query every active entry concurrently and collect all outcomes
    pub async fn fan_out(&self, registry: &ServiceRegistry, image: &ImagePayload) -> Vec<ServiceOutcome> {
        let services: Vec<ServiceDescriptor> = registry.active().cloned().collect();
        if services.is_empty() {
            debug!("No active verification services, skipping fan-out");
            return Vec::new();
        }

        let budget = self.deadline_for(&services);
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + budget;

        debug!(
            services = services.len(),
            budget_ms = budget.as_millis() as u64,
            "Starting verification fan-out"
        );

        let mut tasks = JoinSet::new();
        let mut slot_of: HashMap<task::Id, usize> = HashMap::with_capacity(services.len());
        for (index, service) in services.iter().cloned().enumerate() {
            let backend = Arc::clone(&self.backend);
            let image = image.clone();
            let handle = tasks.spawn(async move { backend.verify(&service, &image).await });
            slot_of.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<ServiceOutcome>> = vec![None; services.len()];

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next_with_id()).await {
                Ok(Some(Ok((id, outcome)))) => {
                    if let Some(&index) = slot_of.get(&id) {
                        slots[index] = Some(outcome);
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!(error = %e, "Verification task failed to complete");
                    if let Some(&index) = slot_of.get(&e.id()) {
                        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                        slots[index] = Some(ServiceOutcome::error(
                            &services[index].id,
                            "verification task aborted",
                            latency_ms,
                        ));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = tasks.len(),
                        budget_ms = budget.as_millis() as u64,
                        "Fan-out deadline reached"
                    );
                    break;
                }
            }
        }

        // Stragglers are cancelled, not awaited
        tasks.abort_all();

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        // Only calls still running at the deadline are left without an outcome
        services
            .iter()
            .zip(slots)
            .map(|(service, slot)| slot.unwrap_or_else(|| ServiceOutcome::timeout(&service.id, elapsed_ms)))
            .collect()
    }
}

// ============================================================================
// Mock Backend for Testing
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::mock::{MockBackend, Script};
    use super::*;
    use idfuse_common::models::ServiceStatus;

    fn registry(ids: &[&str]) -> ServiceRegistry {
        ServiceRegistry::new(
            ids.iter()
                .map(|id| ServiceDescriptor::new(*id, format!("http://localhost/{}", id)))
                .collect(),
        )
        .unwrap()
    }

    fn image() -> ImagePayload {
        ImagePayload::new(vec![0x89u8, b'P', b'N', b'G'], "image/png")
    }

    #[tokio::test]
    async fn test_empty_registry_yields_no_outcomes() {
        let coordinator = FanoutCoordinator::new(Arc::new(MockBackend::new(Duration::from_secs(1))));
        let outcomes = coordinator.fan_out(&ServiceRegistry::empty(), &image()).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_inactive_services_are_skipped() {
        let registry = ServiceRegistry::new(vec![
            ServiceDescriptor::new("a", "http://localhost/a"),
            ServiceDescriptor::new("b", "http://localhost/b").inactive(),
        ])
        .unwrap();
        let backend = MockBackend::new(Duration::from_secs(1))
            .script("a", Script::Respond(vec![("A", 0.9)]))
            .script("b", Script::Respond(vec![("B", 0.9)]));

        let outcomes = FanoutCoordinator::new(Arc::new(backend))
            .fan_out(&registry, &image())
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].source_service_id, "a");
    }

    #[tokio::test]
    async fn test_mixed_results_keep_one_outcome_per_service_in_order() {
        let backend = MockBackend::new(Duration::from_millis(100))
            .script("ok", Script::Respond(vec![("Ana", 0.9)]))
            .script("broken", Script::Fail("HTTP 500"))
            .script("slow", Script::Hang)
            .script("late-ok", Script::Delay(Duration::from_millis(20), vec![("Luis", 0.3)]));

        let coordinator = FanoutCoordinator::new(Arc::new(backend)).with_grace(Duration::from_millis(50));
        let outcomes = coordinator
            .fan_out(&registry(&["ok", "broken", "slow", "late-ok"]), &image())
            .await;

        let summary: Vec<(&str, ServiceStatus)> = outcomes
            .iter()
            .map(|o| (o.source_service_id.as_str(), o.status))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("ok", ServiceStatus::Ok),
                ("broken", ServiceStatus::Error),
                ("slow", ServiceStatus::Timeout),
                ("late-ok", ServiceStatus::Ok),
            ]
        );
        assert!(outcomes[2].candidates.is_none());
    }

    #[tokio::test]
    async fn test_deadline_bounds_total_wait() {
        let backend = MockBackend::new(Duration::from_millis(100))
            .script("a", Script::Hang)
            .script("b", Script::Hang)
            .script("c", Script::Hang);

        let coordinator = FanoutCoordinator::new(Arc::new(backend)).with_grace(Duration::from_millis(50));
        let started = Instant::now();
        let outcomes = coordinator.fan_out(&registry(&["a", "b", "c"]), &image()).await;
        let elapsed = started.elapsed();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.status == ServiceStatus::Timeout));
        assert!(
            elapsed < Duration::from_millis(1000),
            "Deadline is max timeout + grace, not the sum: took {:?}",
            elapsed
        );
    }

    #[tokio::test]
    async fn test_panicking_backend_is_contained() {
        let backend = MockBackend::new(Duration::from_secs(1))
            .script("boom", Script::Panic)
            .script("fine", Script::Respond(vec![("Ana", 0.95)]));

        let outcomes = FanoutCoordinator::new(Arc::new(backend))
            .fan_out(&registry(&["boom", "fine"]), &image())
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].status, ServiceStatus::Error);
        assert_eq!(outcomes[1].status, ServiceStatus::Ok);
    }

    #[tokio::test]
    async fn test_panic_stays_error_when_deadline_fires() {
        let backend = MockBackend::new(Duration::from_millis(100))
            .script("boom", Script::Panic)
            .script("slow", Script::Hang);

        let outcomes = FanoutCoordinator::new(Arc::new(backend))
            .with_grace(Duration::from_millis(50))
            .fan_out(&registry(&["boom", "slow"]), &image())
            .await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].source_service_id, "boom");
        assert_eq!(outcomes[0].status, ServiceStatus::Error);
        assert_eq!(outcomes[0].error.as_deref(), Some("verification task aborted"));
        assert_eq!(outcomes[1].source_service_id, "slow");
        assert_eq!(outcomes[1].status, ServiceStatus::Timeout);
    }

    #[test]
    fn test_deadline_uses_longest_timeout() {
        let coordinator = FanoutCoordinator::new(Arc::new(MockBackend::new(Duration::from_secs(5))));
        let services = vec![ServiceDescriptor::new("a", "http://localhost/a")];
        assert_eq!(coordinator.deadline_for(&services), Duration::from_millis(5500));
        assert_eq!(coordinator.deadline_for(&[]), Duration::from_millis(500));
    }
}
