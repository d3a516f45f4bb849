use std::collections::HashSet;

use ebevis_contracts::EvidenceValue;

pub fn extract<'a, I>(values: &[EvidenceValue], wanted: I) -> Vec<EvidenceValue>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted = wanted.into_iter().collect::<HashSet<_>>();
    values
        .iter()
        .filter(|v| wanted.contains(v.evidence_value_name.as_str()))
        .cloned()
        .collect()
}

pub fn missing<'a, I>(values: &[EvidenceValue], wanted: I) -> Vec<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let present = values
        .iter()
        .map(|v| v.evidence_value_name.as_str())
        .collect::<HashSet<_>>();

    let mut seen = HashSet::new();
    wanted
        .into_iter()
        .filter(|name| !present.contains(name) && seen.insert(*name))
        .collect()
}
