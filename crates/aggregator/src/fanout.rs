use std::sync::Arc;

use ebevis_contracts::{EvidenceRequest, EvidenceValue};
use futures::future::join_all;

use crate::catalog::TolerancePolicy;
use crate::error::AggregationError;
use crate::source::SourceId;
use crate::upstream::EvidenceSource;

#[derive(Debug, Clone)]
pub struct Branch {
    pub source: SourceId,
    pub request: EvidenceRequest,
    pub policy: TolerancePolicy,
}

#[derive(Debug, Clone)]
pub struct BranchOutcome {
    pub source: SourceId,
    pub operation: String,
    pub policy: TolerancePolicy,
    pub result: Result<Vec<EvidenceValue>, AggregationError>,
}

impl BranchOutcome {
    pub fn failed(branch: &Branch, err: AggregationError) -> Self {
        Self {
            source: branch.source,
            operation: branch.request.evidence_code_name.clone(),
            policy: branch.policy,
            result: Err(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BranchResult {
    pub source: SourceId,
    pub operation: String,
    pub values: Vec<EvidenceValue>,
}

#[derive(Clone)]
pub struct FanOutCoordinator {
    source: Arc<dyn EvidenceSource>,
}

impl FanOutCoordinator {
    pub fn new(source: Arc<dyn EvidenceSource>) -> Self {
        Self { source }
    }

    pub async fn dispatch(&self, branches: Vec<Branch>) -> Vec<BranchOutcome> {
        let calls = branches.into_iter().map(|branch| {
            let source = Arc::clone(&self.source);
            async move {
                let result = source.call(branch.source, &branch.request).await;
                BranchOutcome {
                    source: branch.source,
                    operation: branch.request.evidence_code_name,
                    policy: branch.policy,
                    result,
                }
            }
        });

        join_all(calls).await
    }
}

/// Applies each branch's tolerance policy, in branch order.
///
/// The first failed fatal branch decides the error. Failed tolerant branches
/// contribute an empty list.
pub fn settle(outcomes: Vec<BranchOutcome>) -> Result<Vec<BranchResult>, AggregationError> {
    let mut settled = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        match (outcome.result, outcome.policy) {
            (Ok(values), _) => settled.push(BranchResult {
                source: outcome.source,
                operation: outcome.operation,
                values,
            }),
            (Err(err), TolerancePolicy::Fatal) => return Err(err),
            (Err(err), TolerancePolicy::TolerateEmpty) => {
                tracing::warn!(
                    source = %outcome.source.as_str(),
                    operation = %outcome.operation,
                    code = %err.code(),
                    error = %err,
                    "aggregation.branch_failure_tolerated"
                );
                crate::metrics::inc_tolerated_failure(outcome.source.as_str());
                settled.push(BranchResult {
                    source: outcome.source,
                    operation: outcome.operation,
                    values: Vec::new(),
                });
            }
        }
    }

    Ok(settled)
}
