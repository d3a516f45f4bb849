use std::collections::HashMap;

use ebevis_contracts::{EvidenceRequest, EvidenceValue, EvidenceValueType};
use indexmap::IndexMap;

use crate::catalog::{CriterionPlan, DerivationRule};
use crate::extract::extract;
use crate::fanout::BranchResult;
use crate::source::SourceId;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UnifiedRecord {
    values: IndexMap<String, EvidenceValue>,
}

impl UnifiedRecord {
    pub fn into_values(self) -> Vec<EvidenceValue> {
        self.values.into_values().collect()
    }
}

#[cfg(test)]
impl UnifiedRecord {
    fn get(&self, name: &str) -> Option<&EvidenceValue> {
        self.values.get(name)
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// Results are matched to plan branches by `(source, operation)`, so the
/// order they arrive in does not matter. Within one response the first value
/// with a given name wins.
pub fn unify(
    results: &[BranchResult],
    plan: &CriterionPlan,
    request: &EvidenceRequest,
) -> UnifiedRecord {
    let mut ordered = results.iter().collect::<Vec<_>>();
    ordered.sort_by(|a, b| (a.source, a.operation.as_str()).cmp(&(b.source, b.operation.as_str())));

    let mut found: HashMap<String, EvidenceValue> = HashMap::new();
    for result in ordered {
        let Some(branch) = plan.branch(result.source, &result.operation) else {
            tracing::debug!(
                criterion = %plan.code,
                source = %result.source.as_str(),
                operation = %result.operation,
                "unify.unplanned_branch_ignored"
            );
            continue;
        };

        let mappings = branch.fields.resolve(request);
        let picked = extract(&result.values, mappings.iter().map(|m| m.upstream.as_str()));
        for mapping in &mappings {
            let Some(value) = picked
                .iter()
                .find(|v| v.evidence_value_name == mapping.upstream)
            else {
                continue;
            };
            found
                .entry(mapping.output.clone())
                .or_insert_with(|| EvidenceValue {
                    evidence_value_name: mapping.output.clone(),
                    value_type: value.value_type,
                    value: value.value.clone(),
                    source: Some(result.source.label().to_string()),
                });
        }
    }

    for rule in &plan.rules {
        let derived = derive(rule, &found, request);
        found.insert(rule.output().to_string(), derived);
    }

    let mut values = IndexMap::with_capacity(plan.values.len());
    for declared in &plan.values {
        let name = declared.evidence_value_name.as_str();
        match found.remove(name) {
            Some(value) => {
                values.insert(name.to_string(), value);
            }
            None if plan.fixed_shape() => {
                values.insert(name.to_string(), declared.clone());
            }
            None => {}
        }
    }

    UnifiedRecord { values }
}

fn derive(
    rule: &DerivationRule,
    found: &HashMap<String, EvidenceValue>,
    request: &EvidenceRequest,
) -> EvidenceValue {
    let label = SourceId::Ebevis.label();
    match rule {
        DerivationRule::Subject { output } => EvidenceValue::new(
            *output,
            EvidenceValueType::String,
            request.subject().map(|s| serde_json::json!(s)),
            label,
        ),
        DerivationRule::ApprovedEither {
            status_field,
            approved_status,
            numbers_field,
            threshold,
            output,
        } => {
            let status_approved = found
                .get(*status_field)
                .map(|v| v.text().trim().to_lowercase() == approved_status.to_lowercase())
                .unwrap_or(false);
            let numbers = approval_number_count(found.get(*numbers_field).and_then(|v| v.value.as_ref()));

            EvidenceValue::new(
                *output,
                EvidenceValueType::Boolean,
                Some(serde_json::json!(status_approved || numbers > *threshold)),
                label,
            )
        }
    }
}

/// Number of approval numbers carried by a value.
///
/// Sources send either a list, a delimited string or a single number.
pub fn approval_number_count(value: Option<&serde_json::Value>) -> usize {
    match value {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter(|item| match item {
                serde_json::Value::Null => false,
                serde_json::Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
            .count(),
        Some(serde_json::Value::String(s)) => s
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .count(),
        Some(serde_json::Value::Number(_)) => 1,
        _ => 0,
    }
}
