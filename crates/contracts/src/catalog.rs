use serde::{Deserialize, Serialize};

use crate::{EvidenceParameter, EvidenceValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccreditationPartyType {
    Requestor,
    Subject,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartyTypeConstraint {
    PublicAgency,
    PrivateEnterprise,
    Foreign,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedPartyType {
    pub party: AccreditationPartyType,
    pub constraint: PartyTypeConstraint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Requirement {
    #[serde(rename_all = "camelCase")]
    PartyTypeRequirement {
        allowed_party_types: Vec<AllowedPartyType>,
    },
}

impl Requirement {
    pub fn requestor_is_public_agency() -> Self {
        Requirement::PartyTypeRequirement {
            allowed_party_types: vec![AllowedPartyType {
                party: AccreditationPartyType::Requestor,
                constraint: PartyTypeConstraint::PublicAgency,
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCode {
    pub evidence_code_name: String,
    pub description: String,
    pub belongs_to_service_contexts: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<EvidenceParameter>,
    pub values: Vec<EvidenceValue>,
    pub authorization_requirements: Vec<Requirement>,
}
