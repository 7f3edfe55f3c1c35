use std::fmt::Write as _;

use async_trait::async_trait;

use crate::agent::prompt::PromptContext;
use crate::agent::GenerationPurpose;
use crate::analysis::categories::suggest_categories;
use crate::error::ErrorKind;
use crate::workflow::stages::{degrade, Stage, StageContext, StageName, MAX_GENERATED_CHARS};
use crate::workflow::state::{Field, WorkflowState};
use crate::workflow::validate::sanitize;

const FALLBACK_NOTE: &str = " _(fallback data)_";
const SKIPPED_NOTE: &str = " _(skipped at checkpoint)_";

/// Composes whatever the earlier stages produced into the final report and
/// completes the run. Runs on degraded state too.
pub struct Reviewer;

#[async_trait]
impl Stage for Reviewer {
    fn name(&self) -> StageName {
        StageName::Reviewer
    }

    fn owns(&self) -> &'static [Field] {
        &[Field::FinalReport]
    }

    async fn run(&self, mut state: WorkflowState, ctx: &StageContext<'_>) -> WorkflowState {
        let context =
            PromptContext::from_state(GenerationPurpose::Report, &state).with_draft(draft(&state));
        let (summary, summary_note) = match ctx.generate(&context, MAX_GENERATED_CHARS).await {
            Ok(summary) => (summary, ""),
            Err(e) => {
                degrade(&mut state, self.name(), &e);
                (local_summary(&state), FALLBACK_NOTE)
            }
        };
        // Rebuilt so the errors list includes a failed summary call.
        let body = draft(&state);

        let mut report = format!(
            "# README review: {}\n\n",
            state.repo_reference().full_name()
        );
        if state.is_degraded() {
            report.push_str(
                "> This run was degraded. Sections marked _(fallback data)_ were synthesized locally.\n\n",
            );
        }
        let _ = write!(report, "## Summary{summary_note}\n\n{summary}\n\n{body}");

        let feedback = sanitize(state.human_feedback.as_deref(), MAX_GENERATED_CHARS);
        if !feedback.is_empty() {
            let _ = write!(report, "\n## Human feedback\n\n{feedback}\n");
        }

        if let Err(e) = state.complete(report) {
            tracing::error!(error = %e, "Unable to complete the run");
            state.record_failure(self.name().as_str(), ErrorKind::Internal, e.to_string());
            return state;
        }
        tracing::info!(
            repo = %state.repo_reference(),
            degraded = state.is_degraded(),
            "Review complete"
        );
        state
    }
}

fn note(state: &WorkflowState, field: Field) -> &'static str {
    if state.skipped_fields().contains(&field) {
        SKIPPED_NOTE
    } else if state.fallback_fields().contains(&field) {
        FALLBACK_NOTE
    } else {
        ""
    }
}

/// Deterministic report body built from the state alone.
fn draft(state: &WorkflowState) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "## Suggested title{}\n", note(state, Field::ImprovedTitle));
    let _ = writeln!(out, "{}\n", state.improved_title.as_deref().unwrap_or("(none)"));

    let _ = writeln!(out, "## Suggested introduction{}\n", note(state, Field::ImprovedIntro));
    let _ = writeln!(out, "{}\n", state.improved_intro.as_deref().unwrap_or("(none)"));

    let _ = writeln!(out, "## Suggested tags{}\n", note(state, Field::SuggestedTags));
    if state.suggested_tags.is_empty() {
        out.push_str("(none)\n\n");
    } else {
        let tags: Vec<String> = state.suggested_tags.iter().map(|t| format!("`{t}`")).collect();
        let _ = writeln!(out, "{}\n", tags.join(", "));
    }

    let _ = writeln!(out, "## Suggested categories{}\n", note(state, Field::Keywords));
    for category in suggest_categories(&state.keywords, &state.suggested_tags) {
        let _ = writeln!(out, "- {category}");
    }
    out.push('\n');

    let _ = writeln!(out, "## Top keywords{}\n", note(state, Field::Keywords));
    if state.keywords.is_empty() {
        out.push_str("(none)\n\n");
    } else {
        for keyword in &state.keywords {
            let _ = writeln!(out, "- {} ({:.2})", keyword.term, keyword.score);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## Missing sections{}\n", note(state, Field::MissingSections));
    if state.missing_sections.is_empty() {
        out.push_str("None, every standard section is present.\n\n");
    } else {
        for section in &state.missing_sections {
            let _ = writeln!(out, "- {section}");
        }
        out.push('\n');
    }

    let signals = &state.structure_signals;
    let _ = writeln!(out, "## README structure{}\n", note(state, Field::StructureSignals));
    for (section, present) in &signals.sections {
        let mark = if *present { "present" } else { "absent" };
        let _ = writeln!(out, "- {section}: {mark}");
    }
    let _ = writeln!(out, "- words per line: {:.1}\n", signals.word_density);

    if !state.checkpoint_log().is_empty() {
        out.push_str("## Checkpoint decisions\n\n");
        for record in state.checkpoint_log() {
            let _ = writeln!(
                out,
                "- {}: {} ({})",
                record.checkpoint,
                record.decision.as_str(),
                record.source.as_str()
            );
        }
        out.push('\n');
    }

    if !state.errors().is_empty() {
        out.push_str("## Errors\n\n");
        for error in state.errors() {
            let _ = writeln!(
                out,
                "- {} [{}]: {}",
                error.stage,
                error.kind.as_str(),
                error.message
            );
        }
        out.push('\n');
    }

    out
}

fn local_summary(state: &WorkflowState) -> String {
    let mut parts = vec![format!(
        "Automated summary unavailable for `{}`.",
        state.repo_reference().full_name()
    )];
    if !state.missing_sections.is_empty() {
        let missing: Vec<&str> = state.missing_sections.iter().map(String::as_str).collect();
        parts.push(format!("Start by adding the {} sections.", missing.join(", ")));
    }
    let fallback = state.fallback_fields().len();
    if fallback > 0 {
        parts.push(format!(
            "{fallback} field(s) rely on fallback data and should be reviewed by hand."
        ));
    }
    parts.join(" ")
}
