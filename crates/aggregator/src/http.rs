use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ebevis_contracts::{EvidenceRequest, EvidenceValue};
use ebevis_contracts::catalog::EvidenceCode;
use serde::Serialize;
use tracing::Instrument;
use ulid::Ulid;

use crate::catalog::CriterionRegistry;
use crate::config::{AggregatorConfig, StartupError};
use crate::error::AggregationError;
use crate::fanout::FanOutCoordinator;
use crate::service::AggregationService;
use crate::subject::{BrregEntityRegistry, SubjectRewriter};
use crate::upstream::{HttpEvidenceSource, HttpEvidenceSourceConfig};

const REQUEST_ID_HEADER: &str = "x-ebevis-request-id";

#[derive(Clone)]
pub struct AppState {
    service: AggregationService,
    request_timeout: Option<Duration>,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

impl AppState {
    async fn aggregate_within_deadline(
        &self,
        criterion_code: &str,
        request: &EvidenceRequest,
    ) -> Result<Vec<EvidenceValue>, AggregationError> {
        match self.request_timeout {
            Some(timeout) => {
                self.service
                    .aggregate_until(criterion_code, request, tokio::time::sleep(timeout))
                    .await
            }
            None => self.service.aggregate(criterion_code, request).await,
        }
    }
}

pub fn router(config: AggregatorConfig) -> Result<Router, StartupError> {
    let source = HttpEvidenceSource::new(HttpEvidenceSourceConfig {
        endpoints: config.endpoints.clone(),
        function_key: config.function_key.clone(),
        timeout: config.upstream_timeout,
    })
    .map_err(|_| StartupError {
        code: "ERR_HTTP_CLIENT",
        message: "failed to build evidence source http client".to_string(),
    })?;

    let entity_registry =
        BrregEntityRegistry::new(config.entity_registry_url.clone(), config.upstream_timeout)
            .map_err(|_| StartupError {
                code: "ERR_HTTP_CLIENT",
                message: "failed to build entity registry http client".to_string(),
            })?;

    let service = AggregationService::new(
        CriterionRegistry::new(config.approval_number_threshold),
        FanOutCoordinator::new(Arc::new(source)),
        SubjectRewriter::new(Arc::new(entity_registry)),
    );

    Ok(router_with(service, config.request_timeout))
}

pub fn router_with(service: AggregationService, request_timeout: Option<Duration>) -> Router {
    let state = AppState {
        service,
        request_timeout,
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/api/metadata", get(metadata))
        .route("/api/{criterion_code}", post(aggregate))
        .with_state(state)
}

async fn healthz() -> &'static str {
    crate::metrics::observe_http_request("/healthz", "GET", 200, Duration::ZERO);
    "ok"
}

async fn metrics() -> impl IntoResponse {
    let started = Instant::now();
    let response = match crate::metrics::render() {
        Ok((body, content_type)) => {
            let mut headers = HeaderMap::new();
            if let Ok(value) = HeaderValue::from_str(content_type.as_str()) {
                headers.insert(header::CONTENT_TYPE, value);
            }
            (headers, body).into_response()
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    };
    crate::metrics::observe_http_request(
        "/metrics",
        "GET",
        response.status().as_u16(),
        started.elapsed(),
    );
    response
}

async fn metadata(State(state): State<AppState>) -> Json<Vec<EvidenceCode>> {
    let started = Instant::now();
    let codes = state.service.registry().evidence_codes();
    crate::metrics::observe_http_request("/api/metadata", "GET", 200, started.elapsed());
    Json(codes)
}

async fn aggregate(
    State(state): State<AppState>,
    Path(criterion_code): Path<String>,
    headers: HeaderMap,
    body: Result<Json<EvidenceRequest>, JsonRejection>,
) -> Response {
    let request_started = Instant::now();
    let request_id = extract_request_id(&headers);

    let span = tracing::info_span!(
        "http.aggregate",
        request_id = %request_id,
        criterion = %criterion_code,
    );
    let result = match body {
        Ok(Json(request)) => {
            state
                .aggregate_within_deadline(&criterion_code, &request)
                .instrument(span)
                .await
        }
        Err(rejection) => Err(AggregationError::InvalidInput(rejection.body_text())),
    };

    let mut response = match result {
        Ok(values) => (StatusCode::OK, Json(values)).into_response(),
        Err(err) => {
            tracing::warn!(
                request_id = %request_id,
                criterion = %criterion_code,
                code = %err.code(),
                error = %err,
                "http.aggregate_failed"
            );
            error_response(&err).into_response()
        }
    };

    crate::metrics::observe_http_request(
        "/api/{criterion_code}",
        "POST",
        response.status().as_u16(),
        request_started.elapsed(),
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn error_response(err: &AggregationError) -> ApiError {
    let (status, Json(mut body)) =
        json_error(err.status(), err.code(), err.to_string(), err.retryable());
    body.detail = err.upstream_source().map(|source| {
        serde_json::json!({
            "source": source.label(),
        })
    });
    (status, Json(body))
}

fn extract_request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .and_then(sanitize_request_id)
        .unwrap_or_else(|| Ulid::new().to_string())
}

fn sanitize_request_id(raw: &str) -> Option<String> {
    const MAX_LEN: usize = 64;
    let mut out = String::with_capacity(raw.len().min(MAX_LEN));

    for ch in raw.chars() {
        if out.len() >= MAX_LEN {
            break;
        }
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        }
    }

    (!out.is_empty()).then_some(out)
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
    retryable: bool,
) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            code: code.into(),
            message: message.into(),
            retryable,
            detail: None,
        }),
    )
}
