use async_trait::async_trait;

use crate::agent::prompt::PromptContext;
use crate::agent::template::humanize;
use crate::agent::GenerationPurpose;
use crate::analysis::sections;
use crate::error::ErrorKind;
use crate::workflow::stages::{
    degrade, Stage, StageContext, StageName, MAX_GENERATED_CHARS, MAX_TITLE_CHARS,
};
use crate::workflow::state::{Field, WorkflowState};

/// Proposes an improved title and introduction and lists missing sections.
pub struct ContentImprover;

#[async_trait]
impl Stage for ContentImprover {
    fn name(&self) -> StageName {
        StageName::ContentImprover
    }

    fn owns(&self) -> &'static [Field] {
        &[Field::ImprovedTitle, Field::ImprovedIntro, Field::MissingSections]
    }

    async fn run(&self, mut state: WorkflowState, ctx: &StageContext<'_>) -> WorkflowState {
        state.missing_sections = sections::missing_sections(&state.structure_signals);

        let context = PromptContext::from_state(GenerationPurpose::Title, &state);
        let title = match ctx.generate(&context, MAX_TITLE_CHARS).await {
            Ok(raw) => match clean_title(&raw) {
                Some(title) => Some(title),
                None => {
                    state.record_failure(
                        self.name().as_str(),
                        ErrorKind::Generation,
                        "Generated title was blank after cleanup".to_string(),
                    );
                    None
                }
            },
            Err(e) => {
                degrade(&mut state, self.name(), &e);
                None
            }
        };
        let title = match title {
            Some(title) => title,
            None => {
                state.mark_fallback(Field::ImprovedTitle);
                fallback_title(&state)
            }
        };
        state.improved_title = Some(title);

        let context = PromptContext::from_state(GenerationPurpose::Intro, &state);
        match ctx.generate(&context, MAX_GENERATED_CHARS).await {
            Ok(intro) => state.improved_intro = Some(intro),
            Err(e) => {
                degrade(&mut state, self.name(), &e);
                state.mark_fallback(Field::ImprovedIntro);
                state.improved_intro = Some(fallback_intro(&state));
            }
        }

        tracing::info!(
            missing = state.missing_sections.len(),
            title = state.improved_title.as_deref().unwrap_or_default(),
            "Content improved"
        );
        state
    }
}

/// First line of a model reply with Markdown heading marks and quotes removed.
fn clean_title(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let title = line
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '*' | '#') || c.is_whitespace());
    (!title.is_empty()).then(|| title.to_string())
}

fn fallback_title(state: &WorkflowState) -> String {
    state
        .structure_signals
        .title
        .clone()
        .unwrap_or_else(|| humanize(state.repo_reference().name()))
}

fn fallback_intro(state: &WorkflowState) -> String {
    let name = state
        .improved_title
        .clone()
        .unwrap_or_else(|| humanize(state.repo_reference().name()));
    format!(
        "{name} is an open-source project hosted at {}. An improved introduction could not be generated automatically; describe what the project does, who it is for and how to get started.",
        state.repo_reference().html_url()
    )
}
