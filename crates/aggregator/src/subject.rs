use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ebevis_contracts::EvidenceRequest;
use serde::Deserialize;
use tracing::Instrument;

use crate::catalog::Granularity;
use crate::error::AggregationError;
use crate::source::SourceId;

#[async_trait]
pub trait EntityRegistry: Send + Sync {
    /// `Ok(None)` when the organization has no parent or is unknown.
    async fn parent_of(&self, organization_number: &str)
    -> Result<Option<String>, AggregationError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubUnitResponse {
    #[serde(default)]
    overordnet_enhet: Option<String>,
}

#[derive(Clone)]
pub struct BrregEntityRegistry {
    base_url: String,
    http: reqwest::Client,
}

impl BrregEntityRegistry {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, http })
    }

    fn sub_unit_url(&self, organization_number: &str) -> String {
        format!(
            "{}/underenheter/{}",
            self.base_url.trim_end_matches('/'),
            organization_number
        )
    }
}

#[async_trait]
impl EntityRegistry for BrregEntityRegistry {
    async fn parent_of(
        &self,
        organization_number: &str,
    ) -> Result<Option<String>, AggregationError> {
        let source = SourceId::CentralUnitRegistry;
        let response = self
            .http
            .get(self.sub_unit_url(organization_number))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|_| AggregationError::unavailable(source, "entity lookup failed"))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AggregationError::unavailable(
                source,
                format!("entity lookup returned status {}", status.as_u16()),
            ));
        }

        let body = response
            .json::<SubUnitResponse>()
            .await
            .map_err(|_| AggregationError::unparseable(source, "invalid entity lookup response"))?;

        Ok(body
            .overordnet_enhet
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()))
    }
}

#[derive(Clone)]
pub struct SubjectRewriter {
    registry: Arc<dyn EntityRegistry>,
}

impl SubjectRewriter {
    pub fn new(registry: Arc<dyn EntityRegistry>) -> Self {
        Self { registry }
    }

    pub async fn rewrite(
        &self,
        request: &EvidenceRequest,
        granularity: Granularity,
    ) -> Result<EvidenceRequest, AggregationError> {
        match granularity {
            Granularity::AsRequested => Ok(request.clone()),
            Granularity::MainUnit => {
                let Some(subject) = request.subject() else {
                    return Err(AggregationError::InvalidInput(
                        "missing subject organization number".to_string(),
                    ));
                };

                let span = tracing::info_span!(
                    "subject.resolve_main_unit",
                    subject = %subject,
                    resolved = tracing::field::Empty,
                    latency_ms = tracing::field::Empty,
                );
                let started = Instant::now();
                let parent = self
                    .registry
                    .parent_of(subject)
                    .instrument(span.clone())
                    .await?;
                span.record("latency_ms", started.elapsed().as_millis() as u64);

                match parent {
                    Some(parent) => {
                        span.record("resolved", parent.as_str());
                        Ok(request.with_subject(&parent))
                    }
                    None => Ok(request.with_subject(subject)),
                }
            }
        }
    }
}
