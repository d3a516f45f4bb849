use serde::{Deserialize, Serialize};

pub mod catalog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceValueType {
    Boolean,
    Number,
    String,
    DateTime,
    Uri,
    Amount,
    Attachment,
    JsonSchema,
    Binary,
}

/// `value` is absent in catalog declarations and may be `null` in upstream
/// responses when the source has nothing to report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceValue {
    pub evidence_value_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<EvidenceValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl EvidenceValue {
    pub fn new(
        name: impl Into<String>,
        value_type: EvidenceValueType,
        value: Option<serde_json::Value>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            evidence_value_name: name.into(),
            value_type: Some(value_type),
            value,
            source: Some(source.into()),
        }
    }

    pub fn declared(
        name: impl Into<String>,
        value_type: EvidenceValueType,
        source: impl Into<String>,
    ) -> Self {
        Self::new(name, value_type, None, source)
    }

    pub fn text(&self) -> &str {
        self.value
            .as_ref()
            .and_then(|v| v.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceParamType {
    Boolean,
    Number,
    String,
    DateTime,
    Attachment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceParameter {
    pub evidence_param_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_type: Option<EvidenceParamType>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
}

impl EvidenceParameter {
    pub fn as_i64(&self) -> Option<i64> {
        match self.value.as_ref()? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub norwegian_organization_number: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Fields this adapter does not interpret are kept in `extra` and forwarded
/// untouched to upstream sources.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_party: Option<Party>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requestor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_number: Option<String>,
    #[serde(default)]
    pub evidence_code_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<EvidenceParameter>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EvidenceRequest {
    pub fn subject(&self) -> Option<&str> {
        self.subject_party
            .as_ref()
            .and_then(|p| p.norwegian_organization_number.as_deref())
            .or(self.organization_number.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn parameter(&self, name: &str) -> Option<&EvidenceParameter> {
        self.parameters
            .iter()
            .find(|p| p.evidence_param_name == name)
    }

    pub fn with_operation(&self, evidence_code_name: &str) -> Self {
        Self {
            evidence_code_name: evidence_code_name.to_string(),
            ..self.clone()
        }
    }

    pub fn with_subject(&self, organization_number: &str) -> Self {
        let mut subject_party = self.subject_party.clone().unwrap_or_default();
        subject_party.norwegian_organization_number = Some(organization_number.to_string());

        Self {
            subject_party: Some(subject_party),
            organization_number: Some(organization_number.to_string()),
            ..self.clone()
        }
    }
}
