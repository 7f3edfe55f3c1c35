use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorKind, Result};
use crate::workflow::checkpoint::{CheckpointName, DecisionKind, DecisionSource};
use crate::workflow::validate::RepoReference;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Initial,
    Analyzing,
    AwaitingHuman,
    Degraded,
    Complete,
    Aborted,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Complete | Status::Aborted)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Initial => "INITIAL",
            Status::Analyzing => "ANALYZING",
            Status::AwaitingHuman => "AWAITING_HUMAN",
            Status::Degraded => "DEGRADED",
            Status::Complete => "COMPLETE",
            Status::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Fields a stage may own. Used for ownership checks and fallback annotations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    RawReadme,
    WorkingText,
    StructureSignals,
    Keywords,
    SuggestedTags,
    ImprovedTitle,
    ImprovedIntro,
    MissingSections,
    FinalReport,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Field::RawReadme => "raw_readme",
            Field::WorkingText => "working_text",
            Field::StructureSignals => "structure_signals",
            Field::Keywords => "keywords",
            Field::SuggestedTags => "suggested_tags",
            Field::ImprovedTitle => "improved_title",
            Field::ImprovedIntro => "improved_intro",
            Field::MissingSections => "missing_sections",
            Field::FinalReport => "final_report",
        }
    }

    pub const ALL: [Field; 9] = [
        Field::RawReadme,
        Field::WorkingText,
        Field::StructureSignals,
        Field::Keywords,
        Field::SuggestedTags,
        Field::ImprovedTitle,
        Field::ImprovedIntro,
        Field::MissingSections,
        Field::FinalReport,
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureSignals {
    /// Standard section name -> present in the README.
    pub sections: BTreeMap<String, bool>,
    /// Words per non-blank line.
    pub word_density: f64,
    #[serde(default)]
    pub headings: Vec<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl StructureSignals {
    pub fn is_all_absent(&self) -> bool {
        self.sections.values().all(|present| !present)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub term: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub checkpoint: CheckpointName,
    pub decision: DecisionKind,
    pub source: DecisionSource,
    pub edited_text: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub stage: String,
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    repo_reference: RepoReference,
    pub raw_readme: Option<String>,
    /// README text consumed by the stages after the analyzer; replaceable at
    /// the first checkpoint.
    pub working_text: Option<String>,
    pub structure_signals: StructureSignals,
    pub keywords: Vec<Keyword>,
    pub suggested_tags: BTreeSet<String>,
    pub improved_title: Option<String>,
    pub improved_intro: Option<String>,
    pub missing_sections: BTreeSet<String>,
    final_report: Option<String>,
    checkpoint_log: Vec<CheckpointRecord>,
    errors: Vec<ErrorRecord>,
    status: Status,
    /// Fields whose current value was synthesized locally after a failure
    /// or an empty input.
    fallback_fields: BTreeSet<Field>,
    /// Fields explicitly cleared by an OVERRIDE_SKIP decision.
    skipped_fields: BTreeSet<Field>,
    /// Set by the first unrecovered failure; never cleared.
    degraded: bool,
    #[serde(default)]
    pub human_feedback: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowState {
    pub fn new(repo_reference: RepoReference) -> Self {
        Self {
            repo_reference,
            raw_readme: None,
            working_text: None,
            structure_signals: StructureSignals::default(),
            keywords: Vec::new(),
            suggested_tags: BTreeSet::new(),
            improved_title: None,
            improved_intro: None,
            missing_sections: BTreeSet::new(),
            final_report: None,
            checkpoint_log: Vec::new(),
            errors: Vec::new(),
            status: Status::Initial,
            fallback_fields: BTreeSet::new(),
            skipped_fields: BTreeSet::new(),
            degraded: false,
            human_feedback: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn repo_reference(&self) -> &RepoReference {
        &self.repo_reference
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn final_report(&self) -> Option<&str> {
        self.final_report.as_deref()
    }

    pub fn checkpoint_log(&self) -> &[CheckpointRecord] {
        &self.checkpoint_log
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn fallback_fields(&self) -> &BTreeSet<Field> {
        &self.fallback_fields
    }

    pub fn skipped_fields(&self) -> &BTreeSet<Field> {
        &self.skipped_fields
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Text the downstream stages read: the (possibly edited) working text,
    /// or the empty string.
    pub fn text(&self) -> &str {
        self.working_text.as_deref().unwrap_or_default()
    }

    /// Move to `next`, respecting the status invariants.
    ///
    /// Terminal states never change. `Degraded` absorbs further
    /// `Analyzing`/`AwaitingHuman` requests and can only be left for
    /// `Complete` or `Aborted`.
    pub fn transition(&mut self, next: Status) -> Result<()> {
        let current = self.status;
        let allowed = match (current, next) {
            (from, _) if from.is_terminal() => false,
            (_, Status::Initial) => false,
            (Status::Degraded, Status::Analyzing | Status::AwaitingHuman) => {
                tracing::debug!(requested = %next, "Run is degraded, keeping status");
                return Ok(());
            }
            (_, Status::Aborted) => true,
            (_, Status::Degraded) => current != Status::Initial,
            (_, Status::Complete) => {
                matches!(current, Status::Analyzing | Status::Degraded)
                    && self.final_report.is_some()
            }
            (Status::Initial, Status::Analyzing) => true,
            (Status::Analyzing | Status::AwaitingHuman, Status::Analyzing | Status::AwaitingHuman) => true,
            _ => false,
        };

        if !allowed {
            return Err(AppError::InvalidTransition {
                from: current.to_string(),
                to: next.to_string(),
            });
        }

        if current != next {
            tracing::debug!(from = %current, to = %next, "Status transition");
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Record an unrecovered failure and degrade the run.
    pub fn record_error(&mut self, stage: &str, error: &AppError) {
        self.record_failure(stage, error.kind(), error.to_string());
    }

    pub fn record_failure(&mut self, stage: &str, kind: ErrorKind, message: String) {
        if self.status.is_terminal() {
            tracing::warn!(stage, "Ignoring failure on a finished run");
            return;
        }
        self.push_error(stage, kind, message);
        self.mark_degraded();
    }

    /// Degrade the run without an error entry, for designated fallback
    /// paths such as an empty README.
    pub fn mark_degraded(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.degraded = true;
        if self.status != Status::Initial {
            self.status = Status::Degraded;
        }
    }

    /// Append to the audit trail without changing status.
    pub fn push_error(&mut self, stage: &str, kind: ErrorKind, message: String) {
        if self.status.is_terminal() {
            tracing::warn!(stage, "Ignoring error on a finished run");
            return;
        }
        self.errors.push(ErrorRecord {
            stage: stage.to_string(),
            kind,
            message,
            at: Utc::now(),
        });
    }

    pub fn mark_fallback(&mut self, field: Field) {
        self.fallback_fields.insert(field);
    }

    pub(crate) fn mark_skipped(&mut self, field: Field) {
        self.skipped_fields.insert(field);
    }

    pub(crate) fn record_checkpoint(&mut self, record: CheckpointRecord) {
        if self.status.is_terminal() {
            return;
        }
        self.checkpoint_log.push(record);
    }

    /// Set the final report and move to `Complete` together.
    pub fn complete(&mut self, report: String) -> Result<()> {
        if report.trim().is_empty() {
            return Err(AppError::Internal("Final report is empty".to_string()));
        }
        if self.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: Status::Complete.to_string(),
            });
        }
        let previous = self.final_report.replace(report);
        if let Err(e) = self.transition(Status::Complete) {
            self.final_report = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn abort(&mut self) -> Result<()> {
        self.transition(Status::Aborted)
    }

    /// Whether `field` currently holds a value.
    pub fn is_populated(&self, field: Field) -> bool {
        match field {
            Field::RawReadme => self.raw_readme.is_some(),
            Field::WorkingText => self.working_text.is_some(),
            Field::StructureSignals => !self.structure_signals.sections.is_empty(),
            Field::Keywords => !self.keywords.is_empty(),
            Field::SuggestedTags => !self.suggested_tags.is_empty(),
            Field::ImprovedTitle => self.improved_title.is_some(),
            Field::ImprovedIntro => self.improved_intro.is_some(),
            Field::MissingSections => !self.missing_sections.is_empty(),
            Field::FinalReport => self.final_report.is_some(),
        }
    }

    /// Fields whose value differs between `self` and `before`.
    pub fn changed_fields(&self, before: &WorkflowState) -> Vec<Field> {
        Field::ALL
            .into_iter()
            .filter(|field| !self.same_field(before, *field))
            .collect()
    }

    fn same_field(&self, other: &WorkflowState, field: Field) -> bool {
        match field {
            Field::RawReadme => self.raw_readme == other.raw_readme,
            Field::WorkingText => self.working_text == other.working_text,
            Field::StructureSignals => self.structure_signals == other.structure_signals,
            Field::Keywords => self.keywords == other.keywords,
            Field::SuggestedTags => self.suggested_tags == other.suggested_tags,
            Field::ImprovedTitle => self.improved_title == other.improved_title,
            Field::ImprovedIntro => self.improved_intro == other.improved_intro,
            Field::MissingSections => self.missing_sections == other.missing_sections,
            Field::FinalReport => self.final_report == other.final_report,
        }
    }

    /// Copy `field` back from `source`.
    pub(crate) fn restore_field(&mut self, source: &WorkflowState, field: Field) {
        match field {
            Field::RawReadme => self.raw_readme = source.raw_readme.clone(),
            Field::WorkingText => self.working_text = source.working_text.clone(),
            Field::StructureSignals => self.structure_signals = source.structure_signals.clone(),
            Field::Keywords => self.keywords = source.keywords.clone(),
            Field::SuggestedTags => self.suggested_tags = source.suggested_tags.clone(),
            Field::ImprovedTitle => self.improved_title = source.improved_title.clone(),
            Field::ImprovedIntro => self.improved_intro = source.improved_intro.clone(),
            Field::MissingSections => self.missing_sections = source.missing_sections.clone(),
            Field::FinalReport => self.final_report = source.final_report.clone(),
        }
    }
}
