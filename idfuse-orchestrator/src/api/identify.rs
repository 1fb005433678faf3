//! POST /identify-and-answer

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use idfuse_common::models::RequestResult;
use tracing::debug;

use crate::error::ApiResult;
use crate::orchestrator::IDENTIFY_ROUTE;
use crate::validation::{validate_image, ValidationError};
use crate::AppState;

/// Multipart form: `image` (required file) and `question` (optional text)
pub async fn identify_and_answer(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<RequestResult>> {
    let mut image: Option<(Vec<u8>, Option<String>)> = None;
    let mut question: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().map(str::to_string);
                let data = field.bytes().await?;
                image = Some((data.to_vec(), filename));
            }
            Some("question") => {
                question = Some(field.text().await?);
            }
            other => {
                debug!(field = ?other, "Ignoring unknown form field");
            }
        }
    }

    let (data, filename) = image.ok_or(ValidationError::Missing)?;
    let payload = validate_image(data, filename, state.max_image_bytes)?;

    let result = state
        .orchestrator
        .identify_and_answer(payload, question)
        .await?;

    Ok(Json(result))
}

pub fn identify_routes() -> Router<AppState> {
    Router::new().route(IDENTIFY_ROUTE, post(identify_and_answer))
}
