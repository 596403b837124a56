//! Dashboard snapshot.
//!
//! A read-only aggregate of the counters shown on the QHSE dashboard, grouped
//! by domain. Every leaf defaults to zero, whether missing or `null`, so a
//! partial payload still parses and rule predicates never deal with missing
//! values.

mod provider;
mod source;

pub use provider::{DashboardClient, MockSnapshotProvider, SnapshotProvider};
pub use source::SnapshotSource;

use serde::{Deserialize, Deserializer, Serialize};

/// Counters for the three dashboard domains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    #[serde(deserialize_with = "null_as_default")]
    pub laboratoire: LaboratoireStats,
    #[serde(deserialize_with = "null_as_default")]
    pub qualite: QualiteStats,
    #[serde(deserialize_with = "null_as_default")]
    pub hse: HseStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LaboratoireStats {
    #[serde(deserialize_with = "null_as_default")]
    pub echantillons: EchantillonStats,
    #[serde(deserialize_with = "null_as_default")]
    pub analyses: AnalyseStats,
    #[serde(deserialize_with = "null_as_default")]
    pub plans_controle: PlanControleStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EchantillonStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub en_attente: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub en_cours: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub termines: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub conformes: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub non_conformes: u64,
}

impl EchantillonStats {
    /// Share of conforming samples, `None` when there are no samples.
    pub fn conformity_ratio(&self) -> Option<f64> {
        ratio(self.conformes, self.total)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalyseStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub en_cours: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub terminees: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanControleStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub actifs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QualiteStats {
    #[serde(deserialize_with = "null_as_default")]
    pub non_conformites: NonConformiteStats,
    #[serde(deserialize_with = "null_as_default")]
    pub decisions_qualite: DecisionQualiteStats,
    #[serde(deserialize_with = "null_as_default")]
    pub conformite: ConformiteStats,
    #[serde(deserialize_with = "null_as_default")]
    pub audits: AuditStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NonConformiteStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub ouvertes: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub critiques: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecisionQualiteStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub en_attente: u64,
}

/// Overall conformity score, in percent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConformiteStats {
    #[serde(deserialize_with = "null_as_default")]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditStats {
    #[serde(deserialize_with = "null_as_default")]
    pub planifies: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub en_cours: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub termines: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HseStats {
    #[serde(deserialize_with = "null_as_default")]
    pub incidents: IncidentStats,
    #[serde(deserialize_with = "null_as_default")]
    pub risques: RisqueStats,
    #[serde(deserialize_with = "null_as_default")]
    pub epi: EpiStats,
    #[serde(deserialize_with = "null_as_default")]
    pub formations: FormationStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IncidentStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub critiques: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub resolus: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RisqueStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub eleves: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub tres_eleves: u64,
}

/// Personal protective equipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EpiStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub manquants: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormationStats {
    #[serde(deserialize_with = "null_as_default")]
    pub total: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub completees: u64,
}

impl FormationStats {
    /// Share of completed trainings, `None` when there are no trainings.
    pub fn completion_ratio(&self) -> Option<f64> {
        ratio(self.completees, self.total)
    }
}

/// Reads an explicit `null` as the field's default, like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn ratio(part: u64, total: u64) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(part as f64 / total as f64)
    }
}

impl Snapshot {
    /// Fallback snapshot used when the dashboard endpoint is unavailable.
    ///
    /// Under these values only the sample conformity rule fires (10/25).
    pub fn mock() -> Self {
        Self {
            laboratoire: LaboratoireStats {
                echantillons: EchantillonStats {
                    total: 25,
                    en_attente: 5,
                    en_cours: 8,
                    termines: 12,
                    conformes: 10,
                    non_conformes: 2,
                },
                analyses: AnalyseStats {
                    total: 40,
                    en_cours: 6,
                    terminees: 34,
                },
                plans_controle: PlanControleStats {
                    total: 12,
                    actifs: 9,
                },
            },
            qualite: QualiteStats {
                non_conformites: NonConformiteStats {
                    total: 7,
                    ouvertes: 3,
                    critiques: 0,
                },
                decisions_qualite: DecisionQualiteStats {
                    total: 14,
                    en_attente: 3,
                },
                conformite: ConformiteStats { score: 92.0 },
                audits: AuditStats {
                    planifies: 4,
                    en_cours: 2,
                    termines: 18,
                },
            },
            hse: HseStats {
                incidents: IncidentStats {
                    total: 5,
                    critiques: 0,
                    resolus: 4,
                },
                risques: RisqueStats {
                    total: 22,
                    eleves: 3,
                    tres_eleves: 0,
                },
                epi: EpiStats {
                    total: 150,
                    manquants: 0,
                },
                formations: FormationStats {
                    total: 30,
                    completees: 24,
                },
            },
        }
    }
}
