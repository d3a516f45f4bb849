use std::collections::HashMap;
use std::ops::RangeInclusive;

use ebevis_contracts::catalog::{EvidenceCode, Requirement};
use ebevis_contracts::{
    EvidenceParamType, EvidenceParameter, EvidenceRequest, EvidenceValue, EvidenceValueType,
};

use crate::source::SourceId;

pub const TRADE_REGISTER_ENROLMENT: &str = "CRITERION.SELECTION.SUITABILITY.TRADE_REGISTER_ENROLMENT";
pub const TURNOVER_SET_UP: &str = "CRITERION.SELECTION.ECONOMIC_FINANCIAL_STANDING.TURNOVER.SET_UP";
pub const MANAGERIAL_STAFF: &str =
    "CRITERION.SELECTION.TECHNICAL_PROFESSIONAL_ABILITY.MANAGEMENT.MANAGERIAL_STAFF";
pub const AVERAGE_ANNUAL_MANPOWER: &str =
    "CRITERION.SELECTION.TECHNICAL_PROFESSIONAL_ABILITY.MANAGEMENT.AVERAGE_ANNUAL_MANPOWER";
pub const BUSINESS_INSOLVENCY: &str = "CRITERION.EXCLUSION.BUSINESS.INSOLVENCY";
pub const BUSINESS_BANKRUPTCY: &str = "CRITERION.EXCLUSION.BUSINESS.BANKRUPTCY";
pub const TURNOVER_GENERAL_YEARLY: &str =
    "CRITERION.SELECTION.ECONOMIC_FINANCIAL_STANDING.TURNOVER.GENERAL_YEARLY";
pub const CAR_CARE_REGISTER: &str = "BilpleieregisteretEbevis";

const SERVICE_CONTEXT: &str = "eBevis";
const NUMBER_OF_YEARS: &str = "NumberOfYears";
const MAX_ANNUAL_REPORTS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TolerancePolicy {
    Fatal,
    TolerateEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    AsRequested,
    MainUnit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub upstream: String,
    pub output: String,
}

impl FieldMapping {
    pub fn same(name: &str) -> Self {
        Self::renamed(name, name)
    }

    pub fn renamed(upstream: &str, output: &str) -> Self {
        Self {
            upstream: upstream.to_string(),
            output: output.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSelection {
    Fields(Vec<FieldMapping>),
    /// `Year1..YearN` and `Year1PdfUrl..YearNPdfUrl`, N taken from the named
    /// request parameter.
    AnnualReports { years_parameter: &'static str },
}

impl FieldSelection {
    pub fn resolve(&self, request: &EvidenceRequest) -> Vec<FieldMapping> {
        match self {
            FieldSelection::Fields(fields) => fields.clone(),
            FieldSelection::AnnualReports { years_parameter } => {
                let years = request
                    .parameter(years_parameter)
                    .and_then(EvidenceParameter::as_i64)
                    .unwrap_or(MAX_ANNUAL_REPORTS)
                    .clamp(1, MAX_ANNUAL_REPORTS);

                (1..=years)
                    .flat_map(|year| {
                        [
                            FieldMapping::same(&format!("Year{year}")),
                            FieldMapping::same(&format!("Year{year}PdfUrl")),
                        ]
                    })
                    .collect()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    pub source: SourceId,
    pub operation: &'static str,
    pub policy: TolerancePolicy,
    pub granularity: Granularity,
    pub fields: FieldSelection,
    pub require_all: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivationRule {
    Subject { output: &'static str },
    /// `status == approved_status` (case-insensitive) OR
    /// `count(numbers) > threshold`.
    ApprovedEither {
        status_field: &'static str,
        approved_status: &'static str,
        numbers_field: &'static str,
        threshold: usize,
        output: &'static str,
    },
}

impl DerivationRule {
    pub fn output(&self) -> &'static str {
        match self {
            DerivationRule::Subject { output } | DerivationRule::ApprovedEither { output, .. } => {
                *output
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: &'static str,
    pub param_type: EvidenceParamType,
    pub required: bool,
    pub range: Option<RangeInclusive<i64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CriterionPlan {
    pub code: &'static str,
    pub description: &'static str,
    pub parameters: Vec<ParameterSpec>,
    pub branches: Vec<BranchPlan>,
    pub rules: Vec<DerivationRule>,
    pub values: Vec<EvidenceValue>,
}

impl CriterionPlan {
    pub fn branch(&self, source: SourceId, operation: &str) -> Option<&BranchPlan> {
        self.branches
            .iter()
            .find(|b| b.source == source && b.operation == operation)
    }

    /// Composite records always carry every declared value.
    pub fn fixed_shape(&self) -> bool {
        !self.rules.is_empty()
    }

    pub fn evidence_code(&self) -> EvidenceCode {
        EvidenceCode {
            evidence_code_name: self.code.to_string(),
            description: self.description.to_string(),
            belongs_to_service_contexts: vec![SERVICE_CONTEXT.to_string()],
            parameters: self
                .parameters
                .iter()
                .map(|p| EvidenceParameter {
                    evidence_param_name: p.name.to_string(),
                    param_type: Some(p.param_type),
                    required: p.required,
                    value: None,
                })
                .collect(),
            values: self.values.clone(),
            authorization_requirements: vec![Requirement::requestor_is_public_agency()],
        }
    }
}

#[derive(Debug, Clone)]
pub struct CriterionRegistry {
    plans: Vec<CriterionPlan>,
    by_code: HashMap<&'static str, usize>,
}

impl CriterionRegistry {
    pub fn new(approval_number_threshold: usize) -> Self {
        let plans = vec![
            trade_register_enrolment(),
            turnover_set_up(),
            staff_and_registration(
                MANAGERIAL_STAFF,
                "DEPRECATED: Use CRITERION.SELECTION.TECHNICAL_PROFESSIONAL_ABILITY.MANAGEMENT.AVERAGE_ANNUAL_MANPOWER",
            ),
            staff_and_registration(AVERAGE_ANNUAL_MANPOWER, ""),
            business_insolvency(),
            business_bankruptcy(),
            turnover_general_yearly(),
            car_care_register(approval_number_threshold),
        ];

        Self::from_plans(plans)
    }

    pub fn from_plans(plans: Vec<CriterionPlan>) -> Self {
        let by_code = plans
            .iter()
            .enumerate()
            .map(|(idx, plan)| (plan.code, idx))
            .collect();
        Self { plans, by_code }
    }

    pub fn get(&self, code: &str) -> Option<&CriterionPlan> {
        self.by_code.get(code).map(|idx| &self.plans[*idx])
    }

    pub fn plans(&self) -> &[CriterionPlan] {
        &self.plans
    }

    pub fn evidence_codes(&self) -> Vec<EvidenceCode> {
        self.plans.iter().map(CriterionPlan::evidence_code).collect()
    }
}

fn registry_value(name: &str, value_type: EvidenceValueType) -> EvidenceValue {
    EvidenceValue::declared(name, value_type, SourceId::CentralUnitRegistry.label())
}

fn registry_branch(operation: &'static str, fields: &[&str], require_all: bool) -> BranchPlan {
    BranchPlan {
        source: SourceId::CentralUnitRegistry,
        operation,
        policy: TolerancePolicy::Fatal,
        granularity: Granularity::AsRequested,
        fields: FieldSelection::Fields(fields.iter().map(|f| FieldMapping::same(f)).collect()),
        require_all,
    }
}

fn single_registry_criterion(
    code: &'static str,
    fields: &[(&str, EvidenceValueType)],
) -> CriterionPlan {
    let names = fields.iter().map(|(name, _)| *name).collect::<Vec<_>>();
    CriterionPlan {
        code,
        description: "",
        parameters: Vec::new(),
        branches: vec![registry_branch("UnitBasicInformation", &names, true)],
        rules: Vec::new(),
        values: fields
            .iter()
            .map(|(name, value_type)| registry_value(name, *value_type))
            .collect(),
    }
}

fn trade_register_enrolment() -> CriterionPlan {
    single_registry_criterion(
        TRADE_REGISTER_ENROLMENT,
        &[("IsInRegisterOfBusinessEnterprises", EvidenceValueType::Boolean)],
    )
}

fn turnover_set_up() -> CriterionPlan {
    single_registry_criterion(
        TURNOVER_SET_UP,
        &[
            ("CreatedInCentralRegisterForLegalEntities", EvidenceValueType::DateTime),
            ("Established", EvidenceValueType::DateTime),
        ],
    )
}

fn business_insolvency() -> CriterionPlan {
    single_registry_criterion(
        BUSINESS_INSOLVENCY,
        &[
            ("IsBeingDissolved", EvidenceValueType::Boolean),
            ("IsBeingForciblyDissolved", EvidenceValueType::Boolean),
        ],
    )
}

fn business_bankruptcy() -> CriterionPlan {
    single_registry_criterion(
        BUSINESS_BANKRUPTCY,
        &[("IsUnderBankruptcy", EvidenceValueType::Boolean)],
    )
}

fn staff_and_registration(code: &'static str, description: &'static str) -> CriterionPlan {
    CriterionPlan {
        code,
        description,
        parameters: Vec::new(),
        branches: vec![
            registry_branch("UnitBasicInformation", &["NumberOfEmployees"], true),
            registry_branch(
                "CertificateOfRegistration",
                &["CertificateOfRegistrationPdfUrl"],
                true,
            ),
        ],
        rules: Vec::new(),
        values: vec![
            registry_value("NumberOfEmployees", EvidenceValueType::Number),
            registry_value("CertificateOfRegistrationPdfUrl", EvidenceValueType::Uri),
        ],
    }
}

fn turnover_general_yearly() -> CriterionPlan {
    let values = (1..=MAX_ANNUAL_REPORTS)
        .flat_map(|year| {
            [
                registry_value(&format!("Year{year}"), EvidenceValueType::String),
                registry_value(&format!("Year{year}PdfUrl"), EvidenceValueType::Uri),
            ]
        })
        .collect();

    CriterionPlan {
        code: TURNOVER_GENERAL_YEARLY,
        description: "Code for retrieving URLs to PDFs for annual financial reports (1-5 years)",
        parameters: vec![ParameterSpec {
            name: NUMBER_OF_YEARS,
            param_type: EvidenceParamType::Number,
            required: true,
            range: Some(1..=MAX_ANNUAL_REPORTS),
        }],
        branches: vec![BranchPlan {
            source: SourceId::CentralUnitRegistry,
            operation: "AnnualFinancialReport",
            policy: TolerancePolicy::Fatal,
            granularity: Granularity::AsRequested,
            fields: FieldSelection::AnnualReports {
                years_parameter: NUMBER_OF_YEARS,
            },
            require_all: false,
        }],
        rules: Vec::new(),
        values,
    }
}

fn car_care_register(approval_number_threshold: usize) -> CriterionPlan {
    let labour = SourceId::LabourInspection.label();
    let road = SourceId::RoadAdministration.label();
    let ebevis = SourceId::Ebevis.label();

    CriterionPlan {
        code: CAR_CARE_REGISTER,
        description: "Kombinerer bilpleieregisteret til Arbeidstilsynet og verkstedregisteret til Statens vegvesen",
        parameters: Vec::new(),
        branches: vec![
            // The car-care register answers with an error for units it does not
            // know, which is the common case for workshops.
            BranchPlan {
                source: SourceId::LabourInspection,
                operation: "Bilpleieregisteret",
                policy: TolerancePolicy::TolerateEmpty,
                granularity: Granularity::MainUnit,
                fields: FieldSelection::Fields(vec![
                    FieldMapping::renamed("godkjenningsstatus", "godkjenningsstatusArbeidstilsynet"),
                    FieldMapping::renamed("registerstatus", "registerstatusArbeidstilsynet"),
                ]),
                require_all: false,
            },
            BranchPlan {
                source: SourceId::RoadAdministration,
                operation: "Verkstedregisteret",
                policy: TolerancePolicy::Fatal,
                granularity: Granularity::AsRequested,
                fields: FieldSelection::Fields(vec![
                    FieldMapping::renamed("godkjenningsstatus", "godkjenningsstatusStatensVegvesen"),
                    FieldMapping::renamed("godkjenningsnumre", "godkjenningsnumreStatensVegvesen"),
                ]),
                require_all: false,
            },
        ],
        rules: vec![
            DerivationRule::Subject {
                output: "organisasjonsnummer",
            },
            DerivationRule::ApprovedEither {
                status_field: "godkjenningsstatusArbeidstilsynet",
                approved_status: "godkjent",
                numbers_field: "godkjenningsnumreStatensVegvesen",
                threshold: approval_number_threshold,
                output: "godkjentEbevis",
            },
        ],
        values: vec![
            EvidenceValue::declared("organisasjonsnummer", EvidenceValueType::String, ebevis),
            EvidenceValue::declared(
                "godkjenningsstatusArbeidstilsynet",
                EvidenceValueType::String,
                labour,
            ),
            EvidenceValue::declared(
                "registerstatusArbeidstilsynet",
                EvidenceValueType::String,
                labour,
            ),
            EvidenceValue::declared(
                "godkjenningsstatusStatensVegvesen",
                EvidenceValueType::String,
                road,
            ),
            EvidenceValue::declared(
                "godkjenningsnumreStatensVegvesen",
                EvidenceValueType::String,
                road,
            ),
            EvidenceValue::declared("godkjentEbevis", EvidenceValueType::Boolean, ebevis),
        ],
    }
}
