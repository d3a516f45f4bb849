use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceId {
    CentralUnitRegistry,
    LabourInspection,
    RoadAdministration,
    Ebevis,
}

impl SourceId {
    pub fn label(self) -> &'static str {
        match self {
            SourceId::CentralUnitRegistry => "BRREG Enhetsregisteret",
            SourceId::LabourInspection => "Arbeidstilsynet",
            SourceId::RoadAdministration => "Statens vegvesen",
            SourceId::Ebevis => "eBevis",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceId::CentralUnitRegistry => "es_br",
            SourceId::LabourInspection => "es_arbt",
            SourceId::RoadAdministration => "es_svv",
            SourceId::Ebevis => "ebevis",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
