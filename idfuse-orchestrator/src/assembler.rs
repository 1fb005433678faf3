//! Response Assembler

use idfuse_common::models::{ContextAnswer, FusionResult, RequestResult};
use std::time::Duration;
use uuid::Uuid;

/// Combine the fused decision and the optional context answer
pub fn assemble(
    fusion: FusionResult,
    context_answer: Option<ContextAnswer>,
    request_id: Uuid,
    elapsed: Duration,
) -> RequestResult {
    RequestResult {
        decision: fusion.decision,
        identity: fusion.identity,
        candidates: fusion.candidates,
        context_answer,
        timing_ms: round_ms(elapsed),
        request_id,
    }
}

/// Milliseconds rounded to two decimals
pub fn round_ms(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 100_000.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use idfuse_common::models::{Candidate, Decision};

    #[test]
    fn test_assemble_carries_fusion_and_context() {
        let top = Candidate::new("Ana Pérez", 0.88, "svc");
        let fusion = FusionResult {
            decision: Decision::Identified,
            identity: Some(top.clone()),
            candidates: vec![top.clone()],
        };
        let answer = ContextAnswer {
            text: "Office hours are 9 to 5".to_string(),
            citations: vec![],
        };
        let id = Uuid::new_v4();

        let result = assemble(fusion, Some(answer.clone()), id, Duration::from_micros(123_456));
        assert_eq!(result.decision, Decision::Identified);
        assert_eq!(result.identity, Some(top));
        assert_eq!(result.context_answer, Some(answer));
        assert_eq!(result.request_id, id);
        assert_eq!(result.timing_ms, 123.46);
    }

    #[test]
    fn test_missing_context_stays_none() {
        let result = assemble(FusionResult::unknown(vec![]), None, Uuid::nil(), Duration::ZERO);
        assert!(result.context_answer.is_none());
        assert_eq!(result.timing_ms, 0.0);
    }
}
