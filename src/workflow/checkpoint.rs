use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::workflow::state::{CheckpointRecord, Field, WorkflowState};
use crate::workflow::validate::sanitize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointName {
    /// After the analyzer: the README text the later stages will read.
    ReadmeReview,
    /// After the tag recommender: the suggested tags.
    TagReview,
    /// After the content improver: the improved introduction.
    ContentReview,
}

impl CheckpointName {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointName::ReadmeReview => "readme_review",
            CheckpointName::TagReview => "tag_review",
            CheckpointName::ContentReview => "content_review",
        }
    }

    pub fn prompt(self) -> &'static str {
        match self {
            CheckpointName::ReadmeReview => "Proceed to the tag recommender with this README text?",
            CheckpointName::TagReview => "Proceed to the content improver with these tags?",
            CheckpointName::ContentReview => "Proceed to the final reviewer with this introduction?",
        }
    }

    /// The field a decision at this checkpoint applies to.
    pub fn field(self) -> Field {
        match self {
            CheckpointName::ReadmeReview => Field::WorkingText,
            CheckpointName::TagReview => Field::SuggestedTags,
            CheckpointName::ContentReview => Field::ImprovedIntro,
        }
    }

    /// Current value of the governed field, rendered for a human.
    pub fn proposed(self, state: &WorkflowState) -> String {
        match self {
            CheckpointName::ReadmeReview => state.text().to_string(),
            CheckpointName::TagReview => state
                .suggested_tags
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
            CheckpointName::ContentReview => state.improved_intro.clone().unwrap_or_default(),
        }
    }
}

impl std::fmt::Display for CheckpointName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Edit(String),
    OverrideSkip,
    Abort,
}

impl Decision {
    pub fn kind(&self) -> DecisionKind {
        match self {
            Decision::Approve => DecisionKind::Approve,
            Decision::Edit(_) => DecisionKind::Edit,
            Decision::OverrideSkip => DecisionKind::OverrideSkip,
            Decision::Abort => DecisionKind::Abort,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    Approve,
    Edit,
    OverrideSkip,
    Abort,
}

impl DecisionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionKind::Approve => "APPROVE",
            DecisionKind::Edit => "EDIT",
            DecisionKind::OverrideSkip => "OVERRIDE_SKIP",
            DecisionKind::Abort => "ABORT",
        }
    }
}

/// Who produced a checkpoint decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Human,
    /// Substituted without asking anyone (non-interactive mode, or after
    /// repeated invalid edits).
    Defaulted,
}

impl DecisionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionSource::Human => "human",
            DecisionSource::Defaulted => "defaulted",
        }
    }
}

#[async_trait]
pub trait HumanInput: Send + Sync {
    /// Block until a decision for `checkpoint` is available.
    async fn ask(&self, checkpoint: CheckpointName, proposed: &str) -> Result<Decision>;
}

/// How checkpoint decisions are obtained.
pub enum CheckpointMode {
    Interactive(Arc<dyn HumanInput>),
    NonInteractive { default: Decision },
}

impl CheckpointMode {
    pub fn non_interactive() -> Self {
        CheckpointMode::NonInteractive {
            default: Decision::Approve,
        }
    }
}

/// Limits applied when validating edited values.
#[derive(Debug, Clone, Copy)]
pub struct EditLimits {
    pub max_readme_chars: usize,
    pub max_tags: usize,
}

/// Apply `decision` to the field governed by `checkpoint` and log it.
///
/// An `Edit` is validated with the same rules the producing stage uses; on
/// failure the state is left untouched and the error returned so the caller
/// can ask again.
pub fn apply(
    checkpoint: CheckpointName,
    decision: &Decision,
    source: DecisionSource,
    limits: EditLimits,
    state: &mut WorkflowState,
) -> Result<()> {
    let mut edited_text = None;

    match decision {
        Decision::Approve | Decision::Abort => {}
        Decision::Edit(text) => {
            apply_edit(checkpoint, text, limits, state)?;
            edited_text = Some(text.clone());
        }
        Decision::OverrideSkip => {
            match checkpoint {
                CheckpointName::ReadmeReview => state.working_text = Some(String::new()),
                CheckpointName::TagReview => state.suggested_tags.clear(),
                CheckpointName::ContentReview => state.improved_intro = None,
            }
            state.mark_skipped(checkpoint.field());
        }
    }

    tracing::info!(
        checkpoint = %checkpoint,
        decision = ?decision.kind(),
        source = ?source,
        "Checkpoint decision recorded"
    );

    state.record_checkpoint(CheckpointRecord {
        checkpoint,
        decision: decision.kind(),
        source,
        edited_text,
        at: Utc::now(),
    });
    Ok(())
}

fn apply_edit(
    checkpoint: CheckpointName,
    text: &str,
    limits: EditLimits,
    state: &mut WorkflowState,
) -> Result<()> {
    match checkpoint {
        CheckpointName::ReadmeReview => {
            let cleaned = sanitize(Some(text), limits.max_readme_chars);
            if cleaned.is_empty() {
                return Err(AppError::Validation("Edited README text is empty".to_string()));
            }
            if cleaned != text {
                return Err(AppError::Validation(
                    "Edited README text contains control characters, surrounding whitespace or exceeds the size limit"
                        .to_string(),
                ));
            }
            state.working_text = Some(cleaned);
        }
        CheckpointName::TagReview => {
            let tags: Vec<String> = text
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
            if tags.is_empty() {
                return Err(AppError::Validation("Edited tag list is empty".to_string()));
            }
            if tags.len() > limits.max_tags {
                return Err(AppError::Validation(format!(
                    "Too many tags ({}, max {})",
                    tags.len(),
                    limits.max_tags
                )));
            }
            if let Some(bad) = tags.iter().find(|t| !crate::analysis::keywords::is_valid_tag(t)) {
                return Err(AppError::Validation(format!("Invalid tag '{bad}'")));
            }
            state.suggested_tags = tags.into_iter().collect();
        }
        CheckpointName::ContentReview => {
            let cleaned = sanitize(Some(text), crate::workflow::stages::MAX_GENERATED_CHARS);
            if cleaned.is_empty() {
                return Err(AppError::Validation("Edited introduction is empty".to_string()));
            }
            if cleaned != text {
                return Err(AppError::Validation(
                    "Edited introduction contains control characters, surrounding whitespace or exceeds the size limit"
                        .to_string(),
                ));
            }
            state.improved_intro = Some(cleaned);
        }
    }
    Ok(())
}
