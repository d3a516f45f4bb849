use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ebevis_contracts::{EvidenceRequest, EvidenceValue, EvidenceValueType};
use tokio::sync::Barrier;

use crate::error::AggregationError;
use crate::source::SourceId;
use crate::subject::EntityRegistry;
use crate::upstream::EvidenceSource;

pub(crate) type Calls = Arc<Mutex<Vec<(SourceId, EvidenceRequest)>>>;

type Response = (Duration, Result<Vec<EvidenceValue>, AggregationError>);

pub(crate) fn value(name: &str, v: serde_json::Value) -> EvidenceValue {
    let value_type = match &v {
        serde_json::Value::Bool(_) => EvidenceValueType::Boolean,
        serde_json::Value::Number(_) => EvidenceValueType::Number,
        _ => EvidenceValueType::String,
    };
    EvidenceValue::new(name, value_type, Some(v), "upstream")
}

#[derive(Default)]
pub(crate) struct FakeSource {
    responses: HashMap<(SourceId, String), Response>,
    calls: Calls,
    barrier: Option<Arc<Barrier>>,
}

impl FakeSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(
        self,
        source: SourceId,
        operation: &str,
        result: Result<Vec<EvidenceValue>, AggregationError>,
    ) -> Self {
        self.respond_after(source, operation, Duration::ZERO, result)
    }

    pub(crate) fn respond_after(
        mut self,
        source: SourceId,
        operation: &str,
        delay: Duration,
        result: Result<Vec<EvidenceValue>, AggregationError>,
    ) -> Self {
        self.responses
            .insert((source, operation.to_string()), (delay, result));
        self
    }

    pub(crate) fn with_barrier(mut self, parties: usize) -> Self {
        self.barrier = Some(Arc::new(Barrier::new(parties)));
        self
    }

    pub(crate) fn calls(&self) -> Calls {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl EvidenceSource for FakeSource {
    async fn call(
        &self,
        target: SourceId,
        request: &EvidenceRequest,
    ) -> Result<Vec<EvidenceValue>, AggregationError> {
        self.calls
            .lock()
            .expect("calls lock should be available")
            .push((target, request.clone()));

        if let Some(barrier) = &self.barrier {
            barrier.wait().await;
        }

        let Some((delay, result)) = self
            .responses
            .get(&(target, request.evidence_code_name.clone()))
            .cloned()
        else {
            return Err(AggregationError::unavailable(target, "returned status 404"));
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

#[derive(Default)]
pub(crate) struct FakeRegistry {
    pub(crate) parents: HashMap<String, String>,
    pub(crate) fail: bool,
}

impl FakeRegistry {
    pub(crate) fn with_parent(child: &str, parent: &str) -> Self {
        Self {
            parents: HashMap::from([(child.to_string(), parent.to_string())]),
            fail: false,
        }
    }
}

#[async_trait]
impl EntityRegistry for FakeRegistry {
    async fn parent_of(
        &self,
        organization_number: &str,
    ) -> Result<Option<String>, AggregationError> {
        if self.fail {
            return Err(AggregationError::unavailable(
                SourceId::CentralUnitRegistry,
                "entity lookup failed",
            ));
        }
        Ok(self.parents.get(organization_number).cloned())
    }
}
