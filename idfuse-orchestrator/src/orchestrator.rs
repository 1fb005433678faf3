//! Identify-and-answer orchestration
//!
//! Wires one request through the pipeline:
//!
//! ```text
//!            ┌─> fan-out ──> fusion ─┐
//! request ───┤                       ├──> assemble ──> RequestResult
//!            └─> context query ──────┘
//! ```
//!
//! Both branches run concurrently; the slower one sets the response time.
//! Every settled call and the finished request are emitted on the event
//! bus for the recorder. Emission never waits on a subscriber.

use crate::assembler::assemble;
use crate::config::OrchestratorSettings;
use crate::context::{ContextBackend, ContextReport, HttpContextClient};
use crate::fanout::FanoutCoordinator;
use crate::fusion::{FusionEngine, FusionError};
use crate::registry::ServiceRegistry;
use crate::verification::{HttpVerificationClient, ImagePayload, VerificationBackend};
use chrono::Utc;
use idfuse_common::events::{EventBus, IdfuseEvent};
use idfuse_common::models::{
    AccessRecord, Decision, FusionResult, RequestResult, ServiceOutcome, ServiceStatus,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Route recorded in access logs for this operation
pub const IDENTIFY_ROUTE: &str = "/identify-and-answer";

pub struct Orchestrator {
    registry: Arc<ServiceRegistry>,
    fanout: FanoutCoordinator,
    fusion: FusionEngine,
    context: Option<Arc<dyn ContextBackend>>,
    event_bus: EventBus,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        fanout: FanoutCoordinator,
        fusion: FusionEngine,
        event_bus: EventBus,
    ) -> Self {
        Self {
            registry,
            fanout,
            fusion,
            context: None,
            event_bus,
        }
    }

    pub fn with_context(mut self, context: Arc<dyn ContextBackend>) -> Self {
        self.context = Some(context);
        self
    }

    /// Build the production pipeline: HTTP verification and context clients
    pub fn from_settings(
        registry: ServiceRegistry,
        settings: &OrchestratorSettings,
        event_bus: EventBus,
    ) -> anyhow::Result<Self> {
        let backend: Arc<dyn VerificationBackend> =
            Arc::new(HttpVerificationClient::new(settings.verify_timeout)?);
        let fanout = FanoutCoordinator::new(backend).with_grace(settings.fanout_grace);

        let mut orchestrator = Self::new(
            Arc::new(registry),
            fanout,
            FusionEngine::new(settings.fusion),
            event_bus,
        );

        if let Some(url) = &settings.context_url {
            let client = HttpContextClient::new(url.as_str(), settings.context_timeout)?;
            orchestrator = orchestrator.with_context(Arc::new(client));
        }

        Ok(orchestrator)
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn fusion(&self) -> &FusionEngine {
        &self.fusion
    }

    pub fn context(&self) -> Option<&Arc<dyn ContextBackend>> {
        self.context.as_ref()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Identify the person in `image` and answer `question`
    ///
    /// Backend failures never surface here; they become outcome data or a
    /// missing context answer.
    ///
    /// # Errors
    /// [`FusionError`] when a backend result breaks the score contract.
    pub async fn identify_and_answer(
        &self,
        image: ImagePayload,
        question: Option<String>,
    ) -> Result<RequestResult, FusionError> {
        let request_id = Uuid::new_v4();
        let started = Instant::now();
        let question = question
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty());

        info!(
            request_id = %request_id,
            image_bytes = image.len(),
            has_question = question.is_some(),
            services = self.registry.active_count(),
            "Identify request started"
        );

        let context_branch = async {
            match (&self.context, question.as_deref()) {
                (Some(context), Some(q)) => Some(context.ask(q).await),
                _ => None,
            }
        };

        let (outcomes, context_report) =
            tokio::join!(self.fanout.fan_out(&self.registry, &image), context_branch);

        self.emit_service_calls(request_id, &outcomes);
        if let Some(report) = &context_report {
            self.emit_context_call(request_id, report);
        }

        let context_answer = context_report.and_then(|report| report.answer);
        let context_used = context_answer.is_some();

        let fusion = match self.fusion.fuse(&outcomes) {
            Ok(fusion) => fusion,
            Err(e) => {
                error!(request_id = %request_id, error = %e, "Fusion rejected backend results");
                let record = self.access_record(RecordInput {
                    request_id,
                    image: &image,
                    has_question: question.is_some(),
                    fusion: &FusionResult::unknown(Vec::new()),
                    outcomes: &outcomes,
                    timing_ms: crate::assembler::round_ms(started.elapsed()),
                    status_code: 500,
                    context_used,
                });
                self.event_bus
                    .emit_lossy(IdfuseEvent::RequestCompleted { record });
                return Err(e);
            }
        };

        let summary = self.fusion.summarize(&fusion.candidates);
        debug!(
            request_id = %request_id,
            candidates = summary.total_candidates,
            above_threshold = summary.above_threshold,
            max_score = summary.max_score,
            avg_score = summary.avg_score,
            score_spread = summary.score_spread,
            "Fusion summary"
        );

        let record_fusion = fusion.clone();
        let result = assemble(fusion, context_answer, request_id, started.elapsed());

        info!(
            request_id = %request_id,
            decision = %result.decision,
            identity = result.identity.as_ref().map(|c| c.label.as_str()).unwrap_or("-"),
            timing_ms = result.timing_ms,
            "Identify request completed"
        );

        let record = self.access_record(RecordInput {
            request_id,
            image: &image,
            has_question: question.is_some(),
            fusion: &record_fusion,
            outcomes: &outcomes,
            timing_ms: result.timing_ms,
            status_code: 200,
            context_used,
        });
        self.event_bus
            .emit_lossy(IdfuseEvent::RequestCompleted { record });

        Ok(result)
    }

    fn emit_service_calls(&self, request_id: Uuid, outcomes: &[ServiceOutcome]) {
        let timestamp = Utc::now();
        for outcome in outcomes {
            let endpoint = self
                .registry
                .get(&outcome.source_service_id)
                .map(|s| s.endpoint_url.clone())
                .unwrap_or_default();
            self.event_bus.emit_lossy(IdfuseEvent::ServiceCall {
                request_id,
                endpoint,
                outcome: outcome.clone(),
                timestamp,
            });
        }
    }

    fn emit_context_call(&self, request_id: Uuid, report: &ContextReport) {
        let endpoint = self
            .context
            .as_ref()
            .map(|c| c.endpoint())
            .unwrap_or_default();
        self.event_bus.emit_lossy(IdfuseEvent::ContextCall {
            request_id,
            endpoint,
            status: report.status,
            latency_ms: report.latency_ms,
            payload_size_bytes: report.payload_size_bytes,
            error: report.error.clone(),
            timestamp: Utc::now(),
        });
    }

    fn access_record(&self, input: RecordInput<'_>) -> AccessRecord {
        let count = |status: ServiceStatus| {
            input.outcomes.iter().filter(|o| o.status == status).count() as u32
        };
        let identity = input.fusion.identity.as_ref();

        AccessRecord {
            request_id: input.request_id,
            ts: Utc::now(),
            route: IDENTIFY_ROUTE.to_string(),
            has_image: !input.image.is_empty(),
            has_question: input.has_question,
            image_sha256: Some(format!("{:x}", Sha256::digest(&input.image.data))),
            image_size_bytes: input.image.len() as u64,
            decision: if input.status_code == 200 {
                input.fusion.decision
            } else {
                Decision::Unknown
            },
            identity_label: identity.map(|c| c.label.clone()),
            identity_score: identity.map(|c| c.score),
            timing_ms: input.timing_ms,
            status_code: input.status_code,
            services_queried: input.outcomes.len() as u32,
            services_ok: count(ServiceStatus::Ok),
            services_timeout: count(ServiceStatus::Timeout),
            services_error: count(ServiceStatus::Error),
            context_used: input.context_used,
        }
    }
}

struct RecordInput<'a> {
    request_id: Uuid,
    image: &'a ImagePayload,
    has_question: bool,
    fusion: &'a FusionResult,
    outcomes: &'a [ServiceOutcome],
    timing_ms: f64,
    status_code: u16,
    context_used: bool,
}
