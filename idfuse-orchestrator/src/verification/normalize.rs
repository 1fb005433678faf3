//! Response normalization
//!
//! Accepted shapes:
//! - a bare array of `{label|name, score}` objects
//! - an object holding such an array under `candidates` or `matches`
//! - a single-verdict object `{is_me, score, name?}`; the label falls back
//!   to the service id
//!
//! Scores outside 0.0-1.0 are clamped and counted. Anything else is a
//! [`VerificationError::MalformedResponse`].

use super::VerificationError;
use idfuse_common::models::Candidate;
use serde_json::Value;

/// Candidates extracted from one backend response
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    pub candidates: Vec<Candidate>,
    /// How many scores had to be clamped into range
    pub clamped: usize,
}

/// Normalize one backend response body into candidates
pub fn normalize_response(
    service_id: &str,
    body: &Value,
) -> Result<NormalizedResponse, VerificationError> {
    let mut response = NormalizedResponse {
        candidates: Vec::new(),
        clamped: 0,
    };

    match body {
        Value::Array(items) => {
            for item in items {
                push_item(service_id, item, &mut response)?;
            }
        }
        Value::Object(map) => {
            if let Some(list) = map.get("candidates").or_else(|| map.get("matches")) {
                let Some(items) = list.as_array() else {
                    return Err(malformed("candidate list is not an array"));
                };
                for item in items {
                    push_item(service_id, item, &mut response)?;
                }
            } else if map.contains_key("is_me") {
                let label = map
                    .get("name")
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty())
                    .unwrap_or(service_id);
                let score = read_score(map.get("score"))?;
                push_candidate(service_id, label, score, &mut response);
            } else {
                return Err(malformed("object has neither candidates nor is_me"));
            }
        }
        _ => return Err(malformed("expected JSON array or object")),
    }

    Ok(response)
}

fn push_item(
    service_id: &str,
    item: &Value,
    response: &mut NormalizedResponse,
) -> Result<(), VerificationError> {
    let Some(map) = item.as_object() else {
        return Err(malformed("candidate is not an object"));
    };

    let label = map
        .get("label")
        .or_else(|| map.get("name"))
        .and_then(Value::as_str)
        .filter(|label| !label.trim().is_empty())
        .ok_or_else(|| malformed("candidate has no label"))?;

    let score = read_score(map.get("score"))?;
    push_candidate(service_id, label, score, response);
    Ok(())
}

fn push_candidate(service_id: &str, label: &str, score: f64, response: &mut NormalizedResponse) {
    let clamped = score.clamp(0.0, 1.0);
    if clamped != score {
        response.clamped += 1;
    }
    response
        .candidates
        .push(Candidate::new(label, clamped, service_id));
}

fn read_score(value: Option<&Value>) -> Result<f64, VerificationError> {
    let score = value
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed("score missing or not a number"))?;
    if !score.is_finite() {
        return Err(malformed("score is not finite"));
    }
    Ok(score)
}

fn malformed(message: &str) -> VerificationError {
    VerificationError::MalformedResponse(message.to_string())
}
