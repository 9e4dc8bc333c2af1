use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde_json::Value;
use tracing::info;
use wincomp_core::ApplicationError;
use wincomp_dataverse::{create_quote_line_item, NewQuoteLineItem};

use crate::api::{bearer_token, correlation_id, ApiError, ApiState};

pub fn router() -> Router<ApiState> {
    Router::new().route("/api/v1/quote-line-items", post(create))
}

async fn create(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let correlation_id = correlation_id();

    let item: NewQuoteLineItem = serde_json::from_slice(&body).map_err(|error| {
        ApiError::bad_request(format!("invalid request body: {error}"), &correlation_id)
    })?;
    item.validate().map_err(|message| ApiError::bad_request(message, &correlation_id))?;
    let token = bearer_token(&headers, &correlation_id)?;

    let client = state.dataverse(token);
    let created =
        create_quote_line_item(&client, &state.config().dataverse.quote_line_entity_set, &item)
            .await
            .map_err(|error| {
                ApiError::from_application(ApplicationError::from(error), &correlation_id)
            })?;

    info!(
        event_name = "api.quote_line.created",
        correlation_id = %correlation_id,
        quote_id = %item.quote_id,
        "quote line item created"
    );

    Ok((StatusCode::CREATED, Json(created)))
}
