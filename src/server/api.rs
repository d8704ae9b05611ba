use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::{error, warn};

use super::state::AppState;
use crate::schedule::{DirectionFilter, FeedId, ScheduleError, ScheduleQuery, ScheduleResult};

/// JSON `{ "error": ... }` body with a status code.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        let status = match &err {
            ScheduleError::MissingParameter(_) | ScheduleError::InvalidParameter { .. } => {
                StatusCode::BAD_REQUEST
            }
            ScheduleError::UpstreamUnavailable { .. } => {
                error!(error = %err, "Schedule request failed");
                StatusCode::BAD_GATEWAY
            }
        };
        ApiError::new(status, err.to_string())
    }
}

pub async fn schedule(
    Path(stop_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let mut query = ScheduleQuery::new(stop_id)
        .direction(DirectionFilter::from_query(params.get("direction").map(String::as_str)));

    if let Some(raw) = params.get("feed_id").filter(|v| !v.is_empty()) {
        let feed: FeedId = raw.parse().map_err(|_| ScheduleError::InvalidParameter {
            name: "feed_id",
            value: raw.clone(),
        })?;
        query = query.feed(feed);
    }

    match state.aggregator.fetch(&query).await? {
        ScheduleResult::Schedule(schedule) => Ok(Json(schedule).into_response()),
        ScheduleResult::NoDataForStop { feed, stop_id } => Ok(Json(json!({
            "error": "No feed_id at this stopId",
            "feed_id": feed,
            "stopId": stop_id,
        }))
        .into_response()),
    }
}

pub async fn missing_stop() -> ApiError {
    ScheduleError::MissingParameter("stopId").into()
}

pub async fn search_stops(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    let Some(query) = params.get("query").filter(|q| !q.trim().is_empty()) else {
        warn!("Search without query");
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "No query sent"));
    };

    let results = state.search.search(&state.catalog, query);
    Ok(Json(results).into_response())
}

pub async fn stop_info(
    Query(params): Query<HashMap<String, String>>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    match params.get("id").filter(|id| !id.is_empty()) {
        None => Ok(Json(state.catalog.all()).into_response()),
        Some(id) => match state.catalog.get(id) {
            Some(stop) => Ok(Json(json!({ "stopInfo": stop })).into_response()),
            None => Err(ApiError::new(
                StatusCode::NOT_FOUND,
                format!("Invalid id: {id}"),
            )),
        },
    }
}

pub async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Route doesn't exist.")
}
