use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use ebevis_contracts::{EvidenceParamType, EvidenceRequest, EvidenceValue};
use futures::future::join_all;
use tracing::Instrument;

use crate::catalog::{BranchPlan, CriterionPlan, CriterionRegistry, TolerancePolicy};
use crate::error::AggregationError;
use crate::extract::missing;
use crate::fanout::{Branch, BranchOutcome, BranchResult, FanOutCoordinator, settle};
use crate::subject::SubjectRewriter;
use crate::unify::unify;

#[derive(Clone)]
pub struct AggregationService {
    registry: Arc<CriterionRegistry>,
    fanout: FanOutCoordinator,
    rewriter: SubjectRewriter,
}

impl AggregationService {
    pub fn new(
        registry: CriterionRegistry,
        fanout: FanOutCoordinator,
        rewriter: SubjectRewriter,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            fanout,
            rewriter,
        }
    }

    pub fn registry(&self) -> &CriterionRegistry {
        &self.registry
    }

    pub async fn aggregate(
        &self,
        criterion_code: &str,
        request: &EvidenceRequest,
    ) -> Result<Vec<EvidenceValue>, AggregationError> {
        self.aggregate_until(criterion_code, request, std::future::pending())
            .await
    }

    /// Like [`aggregate`](Self::aggregate), but gives up as soon as `cancel`
    /// resolves. In-flight upstream calls are dropped and no partial result
    /// is returned.
    pub async fn aggregate_until<C>(
        &self,
        criterion_code: &str,
        request: &EvidenceRequest,
        cancel: C,
    ) -> Result<Vec<EvidenceValue>, AggregationError>
    where
        C: Future<Output = ()>,
    {
        let span = tracing::info_span!(
            "aggregation.run",
            criterion = %criterion_code,
            subject = tracing::field::Empty,
            branches = tracing::field::Empty,
            outcome = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );
        let started = Instant::now();

        let result = async {
            tokio::select! {
                biased;
                _ = cancel => {
                    tracing::info!("aggregation.cancelled");
                    Err(AggregationError::Cancelled)
                }
                result = self.run(criterion_code, request) => result,
            }
        }
        .instrument(span.clone())
        .await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.code(),
        };
        span.record("outcome", outcome);
        span.record("latency_ms", started.elapsed().as_millis() as u64);

        let criterion_label = self
            .registry
            .get(criterion_code)
            .map(|plan| plan.code)
            .unwrap_or("unknown");
        crate::metrics::observe_aggregation(criterion_label, outcome);

        result
    }

    async fn run(
        &self,
        criterion_code: &str,
        request: &EvidenceRequest,
    ) -> Result<Vec<EvidenceValue>, AggregationError> {
        let plan = self.registry.get(criterion_code).ok_or_else(|| {
            AggregationError::NotFound(format!("unknown criterion {criterion_code}"))
        })?;
        let subject = request.subject().ok_or_else(|| {
            AggregationError::InvalidInput("missing subject organization number".to_string())
        })?;
        validate_parameters(plan, request)?;

        let span = tracing::Span::current();
        span.record("subject", subject);
        span.record("branches", plan.branches.len() as u64);

        let outcomes = self.dispatch(plan, request).await;
        let results = settle(outcomes)?;
        tracing::debug!(settled = results.len(), "aggregation.settled");

        check_required(plan, &results, request)?;

        let values = unify(&results, plan, request).into_values();
        tracing::info!(values = values.len(), "aggregation.completed");
        Ok(values)
    }

    async fn dispatch(&self, plan: &CriterionPlan, request: &EvidenceRequest) -> Vec<BranchOutcome> {
        let prepared = join_all(
            plan.branches
                .iter()
                .map(|branch| self.prepare(branch, request)),
        )
        .await;

        let mut slots = Vec::with_capacity(prepared.len());
        let mut ready = Vec::new();
        let mut ready_slots = Vec::new();
        for (idx, prepared) in prepared.into_iter().enumerate() {
            match prepared {
                Ok(branch) => {
                    ready_slots.push(idx);
                    ready.push(branch);
                    slots.push(None);
                }
                Err(outcome) => slots.push(Some(outcome)),
            }
        }

        tracing::debug!(dispatched = ready.len(), "aggregation.dispatched");
        for (idx, outcome) in ready_slots
            .into_iter()
            .zip(self.fanout.dispatch(ready).await)
        {
            slots[idx] = Some(outcome);
        }

        slots.into_iter().flatten().collect()
    }

    async fn prepare(
        &self,
        plan: &BranchPlan,
        request: &EvidenceRequest,
    ) -> Result<Branch, BranchOutcome> {
        let branch_request = request.with_operation(plan.operation);
        match self
            .rewriter
            .rewrite(&branch_request, plan.granularity)
            .await
        {
            Ok(rewritten) => Ok(Branch {
                source: plan.source,
                request: rewritten,
                policy: plan.policy,
            }),
            Err(err) => Err(BranchOutcome::failed(
                &Branch {
                    source: plan.source,
                    request: branch_request,
                    policy: plan.policy,
                },
                err,
            )),
        }
    }
}

fn validate_parameters(
    plan: &CriterionPlan,
    request: &EvidenceRequest,
) -> Result<(), AggregationError> {
    for spec in &plan.parameters {
        let Some(param) = request
            .parameter(spec.name)
            .filter(|p| p.value.as_ref().is_some_and(|v| !v.is_null()))
        else {
            if spec.required {
                return Err(AggregationError::InvalidInput(format!(
                    "missing required parameter {}",
                    spec.name
                )));
            }
            continue;
        };

        if spec.param_type == EvidenceParamType::Number {
            let number = param.as_i64().ok_or_else(|| {
                AggregationError::InvalidInput(format!(
                    "parameter {} must be a whole number",
                    spec.name
                ))
            })?;
            if let Some(range) = &spec.range
                && !range.contains(&number)
            {
                return Err(AggregationError::InvalidInput(format!(
                    "parameter {} must be between {} and {}",
                    spec.name,
                    range.start(),
                    range.end()
                )));
            }
        }
    }
    Ok(())
}

fn check_required(
    plan: &CriterionPlan,
    results: &[BranchResult],
    request: &EvidenceRequest,
) -> Result<(), AggregationError> {
    for result in results {
        let Some(branch) = plan.branch(result.source, &result.operation) else {
            continue;
        };
        if !branch.require_all || branch.policy != TolerancePolicy::Fatal {
            continue;
        }

        let fields = branch.fields.resolve(request);
        let absent = missing(&result.values, fields.iter().map(|f| f.upstream.as_str()));
        if !absent.is_empty() {
            return Err(AggregationError::NotFound(format!(
                "{} did not report {}",
                result.source.label(),
                absent.join(", ")
            )));
        }
    }
    Ok(())
}
