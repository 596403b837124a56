//! Notification rules and their evaluation.
//!
//! A rule pairs a predicate over the [`Snapshot`] with a formatter that
//! renders the notification when the predicate holds. Evaluation walks the
//! table in order, isolates failing rules and drops notifications whose
//! `(title, message)` pair was already produced by an earlier rule.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use super::model::{Notification, NotificationDraft, NotificationType, RuleModule, RulePriority};
use crate::Result;
use crate::snapshot::Snapshot;

/// Rule predicate.
pub type ConditionFn = Arc<dyn Fn(&Snapshot) -> Result<bool> + Send + Sync>;

/// Rule formatter, only called when the predicate held.
pub type FormatterFn = Arc<dyn Fn(&Snapshot) -> Result<NotificationDraft> + Send + Sync>;

/// A single notification rule.
#[derive(Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub priority: RulePriority,
    pub module: RuleModule,
    condition: ConditionFn,
    formatter: FormatterFn,
}

/// Serializable rule metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleInfo {
    pub id: String,
    pub name: String,
    pub priority: RulePriority,
    pub module: RuleModule,
}

impl Rule {
    /// Create a rule from fallible closures.
    pub fn new<C, F>(
        id: impl Into<String>,
        name: impl Into<String>,
        priority: RulePriority,
        module: RuleModule,
        condition: C,
        formatter: F,
    ) -> Self
    where
        C: Fn(&Snapshot) -> Result<bool> + Send + Sync + 'static,
        F: Fn(&Snapshot) -> Result<NotificationDraft> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            name: name.into(),
            priority,
            module,
            condition: Arc::new(condition),
            formatter: Arc::new(formatter),
        }
    }

    /// Create a rule from closures that cannot fail.
    pub fn simple<C, F>(
        id: impl Into<String>,
        name: impl Into<String>,
        priority: RulePriority,
        module: RuleModule,
        condition: C,
        formatter: F,
    ) -> Self
    where
        C: Fn(&Snapshot) -> bool + Send + Sync + 'static,
        F: Fn(&Snapshot) -> NotificationDraft + Send + Sync + 'static,
    {
        Self::new(
            id,
            name,
            priority,
            module,
            move |s: &Snapshot| Ok(condition(s)),
            move |s: &Snapshot| Ok(formatter(s)),
        )
    }

    pub fn info(&self) -> RuleInfo {
        RuleInfo {
            id: self.id.clone(),
            name: self.name.clone(),
            priority: self.priority,
            module: self.module,
        }
    }

    /// Run the predicate and, if it held, the formatter.
    pub fn evaluate(&self, snapshot: &Snapshot) -> Result<Option<NotificationDraft>> {
        if !(self.condition)(snapshot)? {
            return Ok(None);
        }
        (self.formatter)(snapshot).map(Some)
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}

/// Ordered rule catalog.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A table seeded with the built-in QHSE rules.
    pub fn with_default_rules() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// Append a rule. Ids are not checked for uniqueness: two rules sharing
    /// an id are evaluated independently.
    pub fn add(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Remove every rule with this id, returning how many were removed.
    pub fn remove(&mut self, id: &str) -> usize {
        let before = self.rules.len();
        self.rules.retain(|r| r.id != id);
        before - self.rules.len()
    }

    /// Copy of the table, in evaluation order.
    pub fn rules(&self) -> Vec<Rule> {
        self.rules.clone()
    }

    /// Copy of the rules belonging to `module`.
    pub fn rules_for_module(&self, module: RuleModule) -> Vec<Rule> {
        self.rules
            .iter()
            .filter(|r| r.module == module)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Evaluate every rule against `snapshot`.
    pub fn generate(&self, snapshot: &Snapshot) -> Vec<Notification> {
        self.generate_at(snapshot, Utc::now())
    }

    /// Evaluate every rule against `snapshot`, stamping notifications with `now`.
    ///
    /// Failing rules are logged and skipped. The result keeps table order and
    /// holds at most one notification per `(title, message)` pair.
    pub fn generate_at(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<Notification> {
        let mut notifications: Vec<Notification> = Vec::new();

        for rule in &self.rules {
            let draft = match rule.evaluate(snapshot) {
                Ok(Some(draft)) => draft,
                Ok(None) => continue,
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Notification rule failed, skipping");
                    continue;
                }
            };

            let duplicate = notifications
                .iter()
                .any(|n| n.title == draft.title && n.message == draft.message);
            if duplicate {
                trace!(rule_id = %rule.id, title = %draft.title, "Dropping duplicate notification");
                continue;
            }

            notifications.push(Notification::from_draft(draft, now));
        }

        notifications
    }
}

/// Samples waiting for analysis above which the laboratory is flagged.
pub const PENDING_SAMPLES_THRESHOLD: u64 = 10;
/// Minimum share of conforming samples.
pub const SAMPLE_CONFORMITY_MIN_RATIO: f64 = 0.8;
/// Quality decisions waiting for validation above which quality is flagged.
pub const PENDING_DECISIONS_THRESHOLD: u64 = 5;
/// Minimum conformity score, in percent.
pub const CONFORMITY_SCORE_MIN: f64 = 85.0;
/// Minimum share of completed trainings.
pub const TRAINING_COMPLETION_MIN_RATIO: f64 = 0.7;

/// The built-in rules, grouped by module.
pub fn default_rules() -> Vec<Rule> {
    vec![
        // Laboratoire
        Rule::simple(
            "lab-echantillons-en-attente",
            "Échantillons en attente",
            RulePriority::Medium,
            RuleModule::Laboratoire,
            |s| s.laboratoire.echantillons.en_attente > PENDING_SAMPLES_THRESHOLD,
            |s| {
                NotificationDraft::new(
                    NotificationType::Warning,
                    "Échantillons en attente",
                    format!(
                        "{} échantillons sont en attente d'analyse",
                        s.laboratoire.echantillons.en_attente
                    ),
                )
                .with_action("Voir les échantillons", "/laboratoire")
            },
        ),
        Rule::simple(
            "lab-taux-conformite",
            "Taux de conformité des échantillons",
            RulePriority::High,
            RuleModule::Laboratoire,
            |s| {
                s.laboratoire
                    .echantillons
                    .conformity_ratio()
                    .is_some_and(|r| r < SAMPLE_CONFORMITY_MIN_RATIO)
            },
            |s| {
                let ratio = s
                    .laboratoire
                    .echantillons
                    .conformity_ratio()
                    .unwrap_or_default();
                NotificationDraft::new(
                    NotificationType::Error,
                    "Taux de conformité faible",
                    format!(
                        "Le taux de conformité des échantillons est de {:.0}%",
                        ratio * 100.0
                    ),
                )
                .with_action("Analyser", "/laboratoire")
            },
        ),
        // Qualité
        Rule::simple(
            "qualite-non-conformites-critiques",
            "Non-conformités critiques",
            RulePriority::Critical,
            RuleModule::Qualite,
            |s| s.qualite.non_conformites.critiques > 0,
            |s| {
                NotificationDraft::new(
                    NotificationType::Error,
                    "Non-conformités critiques",
                    format!(
                        "{} non-conformité(s) critique(s) nécessitent une action immédiate",
                        s.qualite.non_conformites.critiques
                    ),
                )
                .with_action("Traiter", "/conformite")
            },
        ),
        Rule::simple(
            "qualite-decisions-en-attente",
            "Décisions qualité en attente",
            RulePriority::Medium,
            RuleModule::Qualite,
            |s| s.qualite.decisions_qualite.en_attente > PENDING_DECISIONS_THRESHOLD,
            |s| {
                NotificationDraft::new(
                    NotificationType::Warning,
                    "Décisions qualité en attente",
                    format!(
                        "{} décisions qualité sont en attente de validation",
                        s.qualite.decisions_qualite.en_attente
                    ),
                )
                .with_action("Valider", "/conformite")
            },
        ),
        Rule::simple(
            "qualite-score-conformite",
            "Score de conformité",
            RulePriority::High,
            RuleModule::Qualite,
            |s| s.qualite.conformite.score < CONFORMITY_SCORE_MIN,
            |s| {
                NotificationDraft::new(
                    NotificationType::Warning,
                    "Score de conformité bas",
                    format!(
                        "Le score de conformité est de {}% (objectif {}%)",
                        s.qualite.conformite.score, CONFORMITY_SCORE_MIN
                    ),
                )
                .with_action("Voir les audits", "/audits")
            },
        ),
        // HSE
        Rule::simple(
            "hse-incidents-critiques",
            "Incidents critiques",
            RulePriority::Critical,
            RuleModule::Hse,
            |s| s.hse.incidents.critiques > 0,
            |s| {
                NotificationDraft::new(
                    NotificationType::Error,
                    "Incident critique",
                    format!(
                        "{} incident(s) critique(s) signalé(s)",
                        s.hse.incidents.critiques
                    ),
                )
                .with_action("Voir les incidents", "/hse")
            },
        ),
        Rule::simple(
            "hse-risques-tres-eleves",
            "Risques très élevés",
            RulePriority::High,
            RuleModule::Hse,
            |s| s.hse.risques.tres_eleves > 0,
            |s| {
                NotificationDraft::new(
                    NotificationType::Warning,
                    "Risques très élevés",
                    format!(
                        "{} risque(s) de niveau très élevé identifié(s)",
                        s.hse.risques.tres_eleves
                    ),
                )
                .with_action("Évaluer", "/hse")
            },
        ),
        Rule::simple(
            "hse-epi-manquants",
            "EPI manquants",
            RulePriority::Medium,
            RuleModule::Hse,
            |s| s.hse.epi.manquants > 0,
            |s| {
                NotificationDraft::new(
                    NotificationType::Warning,
                    "EPI manquants",
                    format!(
                        "{} équipement(s) de protection individuelle manquant(s)",
                        s.hse.epi.manquants
                    ),
                )
                .with_action("Commander", "/hse")
            },
        ),
        Rule::simple(
            "hse-formations-incompletes",
            "Formations incomplètes",
            RulePriority::Medium,
            RuleModule::Hse,
            |s| {
                s.hse
                    .formations
                    .completion_ratio()
                    .is_some_and(|r| r < TRAINING_COMPLETION_MIN_RATIO)
            },
            |s| {
                let ratio = s.hse.formations.completion_ratio().unwrap_or_default();
                NotificationDraft::new(
                    NotificationType::Info,
                    "Formations incomplètes",
                    format!(
                        "Le taux de complétion des formations est de {:.0}%",
                        ratio * 100.0
                    ),
                )
                .with_action("Planifier", "/hse")
            },
        ),
    ]
}
