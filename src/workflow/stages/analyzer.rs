use async_trait::async_trait;

use crate::analysis::sections;
use crate::workflow::stages::{degrade, Stage, StageContext, StageName};
use crate::workflow::state::{Field, WorkflowState};
use crate::workflow::validate::sanitize;

/// Fetches the README and computes its structure signals.
pub struct RepoAnalyzer;

#[async_trait]
impl Stage for RepoAnalyzer {
    fn name(&self) -> StageName {
        StageName::RepoAnalyzer
    }

    fn owns(&self) -> &'static [Field] {
        &[Field::RawReadme, Field::WorkingText, Field::StructureSignals]
    }

    async fn run(&self, mut state: WorkflowState, ctx: &StageContext<'_>) -> WorkflowState {
        let repo = state.repo_reference().clone();

        let raw = match ctx.fetch_readme(&repo).await {
            Ok(raw) => raw,
            Err(e) => {
                degrade(&mut state, self.name(), &e);
                state.mark_fallback(Field::RawReadme);
                state.mark_fallback(Field::WorkingText);
                String::new()
            }
        };

        let text = sanitize(Some(&raw), ctx.limits.max_readme_chars);
        tracing::info!(
            repo = %repo,
            fetched_chars = raw.chars().count(),
            kept_chars = text.chars().count(),
            "README sanitized"
        );
        state.raw_readme = Some(raw);
        state.working_text = Some(text);

        if state.text().is_empty() {
            tracing::warn!(repo = %repo, "README is empty, marking every section absent");
            state.structure_signals = sections::all_absent();
            state.mark_fallback(Field::StructureSignals);
            state.mark_degraded();
            return state;
        }

        state.structure_signals = sections::analyze(state.text());
        tracing::info!(
            repo = %repo,
            headings = state.structure_signals.headings.len(),
            word_density = state.structure_signals.word_density,
            "Structure analyzed"
        );
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ErrorKind};
    use crate::test_support::{Harness, ScriptedFetcher, README};
    use crate::workflow::state::Status;
    use crate::workflow::validate::validate;

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new(validate("acme/demo-parser").unwrap());
        state.transition(Status::Analyzing).unwrap();
        state
    }

    #[tokio::test]
    async fn analyzes_fetched_readme() {
        let harness = Harness::default();
        let state = RepoAnalyzer.run(state(), &harness.context()).await;

        assert_eq!(state.raw_readme.as_deref(), Some(README));
        assert_eq!(state.text(), README.trim());
        let sections = &state.structure_signals.sections;
        assert!(sections["introduction"]);
        assert!(!sections["installation"]);
        assert_eq!(state.structure_signals.title.as_deref(), Some("Demo Parser"));
        assert!(state.errors().is_empty());
        assert!(state.fallback_fields().is_empty());
    }

    #[tokio::test]
    async fn is_idempotent_for_the_same_readme() {
        let harness = Harness::default();
        let first = RepoAnalyzer.run(state(), &harness.context()).await;
        let second = RepoAnalyzer.run(first.clone(), &harness.context()).await;
        assert_eq!(first.structure_signals, second.structure_signals);
        assert_eq!(first.working_text, second.working_text);
    }

    #[tokio::test]
    async fn recovers_from_transient_fetch_failures() {
        let harness = Harness {
            fetcher: ScriptedFetcher::flaky(2, README),
            ..Harness::default()
        };
        let state = RepoAnalyzer.run(state(), &harness.context()).await;

        assert_eq!(harness.fetcher.calls(), 3);
        assert!(state.errors().is_empty());
        assert!(!state.is_degraded());
        assert_eq!(state.status(), Status::Analyzing);
    }

    #[tokio::test]
    async fn exhausted_fetch_degrades_with_fallback() {
        let harness = Harness {
            fetcher: ScriptedFetcher::flaky(u32::MAX, README),
            ..Harness::default()
        };
        let state = RepoAnalyzer.run(state(), &harness.context()).await;

        assert_eq!(harness.fetcher.calls(), 3);
        assert_eq!(state.status(), Status::Degraded);
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.errors()[0].kind, ErrorKind::Network);
        assert_eq!(state.raw_readme.as_deref(), Some(""));
        assert!(state.structure_signals.is_all_absent());
        assert!(state.fallback_fields().contains(&Field::RawReadme));
        assert!(state.fallback_fields().contains(&Field::StructureSignals));
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let harness = Harness {
            fetcher: ScriptedFetcher::new(|_| Err(AppError::NotFound("no README".into()))),
            ..Harness::default()
        };
        let state = RepoAnalyzer.run(state(), &harness.context()).await;
        assert_eq!(harness.fetcher.calls(), 1);
        assert_eq!(state.errors()[0].kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn empty_readme_degrades_without_an_error() {
        let harness = Harness {
            fetcher: ScriptedFetcher::ok(" \r\n\u{7}\n"),
            ..Harness::default()
        };
        let state = RepoAnalyzer.run(state(), &harness.context()).await;

        assert!(state.errors().is_empty());
        assert!(state.is_degraded());
        assert_eq!(state.status(), Status::Degraded);
        assert_eq!(state.text(), "");
        assert!(state.structure_signals.is_all_absent());
        assert_eq!(state.structure_signals.sections.len(), 5);
        assert!(state.fallback_fields().contains(&Field::StructureSignals));
    }
}
