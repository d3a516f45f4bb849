use std::time::{Duration, Instant};

use async_trait::async_trait;
use ebevis_contracts::{EvidenceRequest, EvidenceValue};
use tracing::Instrument;

use crate::error::AggregationError;
use crate::source::SourceId;

#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn call(
        &self,
        target: SourceId,
        request: &EvidenceRequest,
    ) -> Result<Vec<EvidenceValue>, AggregationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoints {
    pub central_unit_registry: String,
    pub labour_inspection: String,
    pub road_administration: String,
}

impl SourceEndpoints {
    pub fn base_url(&self, target: SourceId) -> Option<&str> {
        match target {
            SourceId::CentralUnitRegistry => Some(&self.central_unit_registry),
            SourceId::LabourInspection => Some(&self.labour_inspection),
            SourceId::RoadAdministration => Some(&self.road_administration),
            SourceId::Ebevis => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionKey {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct HttpEvidenceSourceConfig {
    pub endpoints: SourceEndpoints,
    pub function_key: Option<FunctionKey>,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct HttpEvidenceSource {
    http: reqwest::Client,
    endpoints: SourceEndpoints,
    function_key: Option<FunctionKey>,
}

impl HttpEvidenceSource {
    pub fn new(config: HttpEvidenceSourceConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self::with_client(http, config.endpoints, config.function_key))
    }

    pub fn with_client(
        http: reqwest::Client,
        endpoints: SourceEndpoints,
        function_key: Option<FunctionKey>,
    ) -> Self {
        Self {
            http,
            endpoints,
            function_key,
        }
    }

    fn operation_url(&self, target: SourceId, operation: &str) -> Option<String> {
        let base = self.endpoints.base_url(target)?;
        Some(format!("{}/{}", base.trim_end_matches('/'), operation))
    }
}

#[async_trait]
impl EvidenceSource for HttpEvidenceSource {
    async fn call(
        &self,
        target: SourceId,
        request: &EvidenceRequest,
    ) -> Result<Vec<EvidenceValue>, AggregationError> {
        let operation = request.evidence_code_name.as_str();
        let span = tracing::info_span!(
            "upstream.call",
            source = %target.as_str(),
            operation = %operation,
            status_code = tracing::field::Empty,
            result_count = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );
        let started = Instant::now();

        let result = async {
            let url = self.operation_url(target, operation).ok_or_else(|| {
                AggregationError::unavailable(target, "no endpoint configured for source")
            })?;

            let mut builder = self.http.post(url).json(request);
            if let Some(key) = &self.function_key {
                builder = builder.query(&[(key.name.as_str(), key.value.as_str())]);
            }

            let response = builder.send().await.map_err(|err| {
                let reason = if err.is_timeout() {
                    "request timed out"
                } else {
                    "request failed"
                };
                AggregationError::unavailable(target, reason)
            })?;

            let status = response.status();
            tracing::Span::current().record("status_code", status.as_u16());
            if !status.is_success() {
                return Err(AggregationError::unavailable(
                    target,
                    format!("returned status {}", status.as_u16()),
                ));
            }

            let bytes = response
                .bytes()
                .await
                .map_err(|_| AggregationError::unavailable(target, "response read failed"))?;

            serde_json::from_slice::<Vec<EvidenceValue>>(&bytes).map_err(|err| {
                AggregationError::unparseable(target, format!("expected evidence values: {err}"))
            })
        }
        .instrument(span.clone())
        .await;

        let elapsed = started.elapsed();
        let outcome = match &result {
            Ok(values) => {
                span.record("result_count", values.len() as u64);
                "ok"
            }
            Err(AggregationError::UpstreamUnparseable { .. }) => "unparseable",
            Err(_) => "unavailable",
        };
        span.record("latency_ms", elapsed.as_millis() as u64);
        span.record("outcome", outcome);
        crate::metrics::observe_upstream_call(target.as_str(), outcome, elapsed);

        result
    }
}
