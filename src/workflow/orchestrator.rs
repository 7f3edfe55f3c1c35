use std::sync::Arc;

use crate::agent::TextGenerator;
use crate::analysis::keywords::KeywordExtractor;
use crate::error::{ErrorKind, Result};
use crate::exit_codes;
use crate::platform::ContentFetcher;
use crate::storage::ReportSink;
use crate::workflow::checkpoint::{
    self, CheckpointMode, CheckpointName, Decision, DecisionSource, EditLimits,
};
use crate::workflow::retry::RetryPolicy;
use crate::workflow::stages::{
    ContentImprover, RepoAnalyzer, Reviewer, Stage, StageContext, StageLimits, StageName,
    TagRecommender,
};
use crate::workflow::state::{Status, WorkflowState};
use crate::workflow::validate::validate;

const ORCHESTRATOR: &str = "orchestrator";

/// Stages in execution order, each followed by its checkpoint.
const PIPELINE: [(&dyn Stage, Option<CheckpointName>); 4] = [
    (&RepoAnalyzer, Some(CheckpointName::ReadmeReview)),
    (&TagRecommender, Some(CheckpointName::TagReview)),
    (&ContentImprover, Some(CheckpointName::ContentReview)),
    (&Reviewer, None),
];

/// Result of one run. The state is always terminal.
#[derive(Debug)]
pub struct RunOutcome {
    pub state: WorkflowState,
    /// Where the sink stored the result, if it succeeded.
    pub location: Option<String>,
    pub storage_error: Option<String>,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self.state.status() {
            Status::Complete => exit_codes::OK,
            _ => exit_codes::ABORTED,
        }
    }
}

pub struct Orchestrator {
    fetcher: Arc<dyn ContentFetcher>,
    extractor: Arc<dyn KeywordExtractor>,
    generator: Arc<dyn TextGenerator>,
    sink: Arc<dyn ReportSink>,
    mode: CheckpointMode,
    retry: RetryPolicy,
    limits: StageLimits,
    max_edit_attempts: u32,
    human_feedback: Option<String>,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        extractor: Arc<dyn KeywordExtractor>,
        generator: Arc<dyn TextGenerator>,
        sink: Arc<dyn ReportSink>,
        mode: CheckpointMode,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            generator,
            sink,
            mode,
            retry: RetryPolicy::default(),
            limits: StageLimits::default(),
            max_edit_attempts: 3,
            human_feedback: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_limits(mut self, limits: StageLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_max_edit_attempts(mut self, attempts: u32) -> Self {
        self.max_edit_attempts = attempts.max(1);
        self
    }

    pub fn with_human_feedback(mut self, feedback: Option<String>) -> Self {
        self.human_feedback = feedback;
        self
    }

    /// Validate `reference` and run the whole pipeline against it.
    ///
    /// Only an invalid reference is returned as an error; every later
    /// failure is recorded on the state.
    pub async fn run(&self, reference: &str) -> Result<RunOutcome> {
        let repo = validate(reference)?;

        let mut state = WorkflowState::new(repo);
        state.human_feedback = self.human_feedback.clone();
        tracing::info!(repo = %state.repo_reference(), "Starting README review");

        state = self.drive(state).await;

        if !state.status().is_terminal() {
            tracing::error!(status = %state.status(), "Pipeline ended without a terminal status");
            state.push_error(
                ORCHESTRATOR,
                ErrorKind::Internal,
                format!("Pipeline ended in {}", state.status()),
            );
            if let Err(e) = state.abort() {
                tracing::error!(error = %e, "Unable to abort run");
            }
        }

        let (location, storage_error) = match self.sink.store(&state).await {
            Ok(location) => {
                tracing::info!(location = %location, "Result stored");
                (Some(location), None)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to store result");
                (None, Some(e.to_string()))
            }
        };

        tracing::info!(
            repo = %state.repo_reference(),
            status = %state.status(),
            degraded = state.is_degraded(),
            errors = state.errors().len(),
            "Review finished"
        );

        Ok(RunOutcome {
            state,
            location,
            storage_error,
        })
    }

    async fn drive(&self, mut state: WorkflowState) -> WorkflowState {
        let ctx = StageContext {
            retry: &self.retry,
            fetcher: self.fetcher.as_ref(),
            extractor: self.extractor.as_ref(),
            generator: self.generator.as_ref(),
            limits: self.limits,
        };

        for (stage, checkpoint) in PIPELINE {
            if let Err(e) = state.transition(Status::Analyzing) {
                tracing::error!(stage = %stage.name(), error = %e, "Cannot start stage");
                return state;
            }

            tracing::info!(stage = %stage.name(), "Stage started");
            let before = state.clone();
            state = stage.run(state, &ctx).await;
            state = enforce_ownership(stage, &before, state);
            tracing::info!(stage = %stage.name(), status = %state.status(), "Stage finished");

            if state.status().is_terminal() {
                return state;
            }

            let Some(checkpoint) = checkpoint else {
                continue;
            };
            if let Err(e) = state.transition(Status::AwaitingHuman) {
                tracing::error!(checkpoint = %checkpoint, error = %e, "Cannot pause");
                return state;
            }
            if !self.pause(checkpoint, &mut state).await {
                tracing::warn!(checkpoint = %checkpoint, "Run aborted at checkpoint");
                if let Err(e) = state.abort() {
                    tracing::error!(error = %e, "Unable to abort run");
                }
                return state;
            }
        }

        state
    }

    /// Resolve `checkpoint`. Returns `false` when the run must stop.
    async fn pause(&self, checkpoint: CheckpointName, state: &mut WorkflowState) -> bool {
        let limits = EditLimits {
            max_readme_chars: self.limits.max_readme_chars,
            max_tags: self.limits.max_tags,
        };

        let input = match &self.mode {
            CheckpointMode::NonInteractive { default } => {
                return match checkpoint::apply(
                    checkpoint,
                    default,
                    DecisionSource::Defaulted,
                    limits,
                    state,
                ) {
                    Ok(()) => *default != Decision::Abort,
                    Err(e) => {
                        state.push_error(checkpoint.as_str(), e.kind(), e.to_string());
                        record_defaulted(checkpoint, Decision::Approve, limits, state);
                        true
                    }
                };
            }
            CheckpointMode::Interactive(input) => input,
        };

        let mut rejected = 0;
        loop {
            let proposed = checkpoint.proposed(state);
            let decision = match input.ask(checkpoint, &proposed).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::error!(checkpoint = %checkpoint, error = %e, "Human input failed");
                    state.push_error(checkpoint.as_str(), e.kind(), e.to_string());
                    record_defaulted(checkpoint, Decision::Abort, limits, state);
                    return false;
                }
            };

            match checkpoint::apply(checkpoint, &decision, DecisionSource::Human, limits, state) {
                Ok(()) => return decision != Decision::Abort,
                Err(e) => {
                    rejected += 1;
                    tracing::warn!(
                        checkpoint = %checkpoint,
                        attempt = rejected,
                        error = %e,
                        "Rejected checkpoint edit"
                    );
                    state.push_error(checkpoint.as_str(), e.kind(), e.to_string());
                    if rejected >= self.max_edit_attempts {
                        record_defaulted(checkpoint, Decision::Approve, limits, state);
                        return true;
                    }
                }
            }
        }
    }
}

fn record_defaulted(
    checkpoint: CheckpointName,
    decision: Decision,
    limits: EditLimits,
    state: &mut WorkflowState,
) {
    if let Err(e) = checkpoint::apply(checkpoint, &decision, DecisionSource::Defaulted, limits, state)
    {
        tracing::error!(checkpoint = %checkpoint, error = %e, "Unable to record decision");
    }
}

/// Undo every change `stage` made outside the fields it owns.
fn enforce_ownership(
    stage: &dyn Stage,
    before: &WorkflowState,
    mut state: WorkflowState,
) -> WorkflowState {
    let name = stage.name();

    if state.status() == Status::Complete && name != StageName::Reviewer {
        tracing::error!(stage = %name, "Stage completed the run without being the reviewer");
        let mut restored = before.clone();
        restored.record_failure(
            name.as_str(),
            ErrorKind::Contract,
            format!("{name} attempted to complete the run"),
        );
        return restored;
    }

    let owned = stage.owns();
    for field in state.changed_fields(before) {
        let cleared = before.is_populated(field) && !state.is_populated(field);
        let message = if !owned.contains(&field) {
            format!("{name} modified {} which it does not own", field.as_str())
        } else if cleared {
            format!("{name} cleared {} which was already populated", field.as_str())
        } else {
            continue;
        };
        tracing::error!(stage = %name, field = field.as_str(), "Ownership violation: {message}");
        state.restore_field(before, field);
        state.record_failure(name.as_str(), ErrorKind::Contract, message);
    }
    state
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::analysis::keywords::FrequencyExtractor;
    use crate::error::AppError;
    use crate::test_support::{
        retry, MemorySink, ScriptedFetcher, ScriptedGenerator, ScriptedInput, README,
    };
    use crate::workflow::checkpoint::DecisionKind;
    use crate::workflow::state::{Field, Keyword};

    struct Fixture {
        fetcher: Arc<ScriptedFetcher>,
        generator: Arc<ScriptedGenerator>,
        input: Arc<ScriptedInput>,
        sink: Arc<MemorySink>,
    }

    impl Fixture {
        fn new(fetcher: ScriptedFetcher, decisions: Vec<Decision>) -> Self {
            Self {
                fetcher: Arc::new(fetcher),
                generator: Arc::new(ScriptedGenerator::canned()),
                input: Arc::new(ScriptedInput::decisions(decisions)),
                sink: Arc::new(MemorySink::default()),
            }
        }

        fn orchestrator(&self) -> Orchestrator {
            self.with_mode(CheckpointMode::Interactive(self.input.clone()))
        }

        fn with_mode(&self, mode: CheckpointMode) -> Orchestrator {
            Orchestrator::new(
                self.fetcher.clone(),
                Arc::new(FrequencyExtractor::new(10)),
                self.generator.clone(),
                self.sink.clone(),
                mode,
            )
            .with_retry(retry())
        }
    }

    fn decisions(state: &WorkflowState) -> Vec<(CheckpointName, DecisionKind, DecisionSource)> {
        state
            .checkpoint_log()
            .iter()
            .map(|r| (r.checkpoint, r.decision, r.source))
            .collect()
    }

    #[tokio::test]
    async fn approved_run_completes() {
        let fixture = Fixture::new(
            ScriptedFetcher::ok(README),
            vec![Decision::Approve, Decision::Approve, Decision::Approve],
        );
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();
        let state = &outcome.state;

        assert_eq!(state.status(), Status::Complete);
        assert_eq!(outcome.exit_code(), exit_codes::OK);
        assert!(state.final_report().is_some_and(|r| !r.is_empty()));
        let missing: Vec<&str> = state.missing_sections.iter().map(String::as_str).collect();
        assert_eq!(missing, vec!["installation", "license"]);
        assert!(state.errors().is_empty());
        assert!(!state.is_degraded());
        assert_eq!(
            decisions(state),
            vec![
                (CheckpointName::ReadmeReview, DecisionKind::Approve, DecisionSource::Human),
                (CheckpointName::TagReview, DecisionKind::Approve, DecisionSource::Human),
                (CheckpointName::ContentReview, DecisionKind::Approve, DecisionSource::Human),
            ]
        );
        assert_eq!(fixture.sink.stored().len(), 1);
        assert_eq!(outcome.location.as_deref(), Some("memory://acme/demo-parser"));
    }

    #[tokio::test]
    async fn transient_fetch_failures_leave_no_trace() {
        let fixture = Fixture::new(ScriptedFetcher::flaky(2, README), vec![]);
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();

        assert_eq!(fixture.fetcher.calls(), 3);
        assert_eq!(outcome.state.status(), Status::Complete);
        assert!(outcome.state.errors().is_empty());
        assert!(!outcome.state.is_degraded());
    }

    #[tokio::test]
    async fn exhausted_fetch_degrades_but_completes() {
        let fixture = Fixture::new(ScriptedFetcher::flaky(u32::MAX, README), vec![]);
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();
        let state = &outcome.state;

        assert_eq!(fixture.fetcher.calls(), 3);
        assert_eq!(state.status(), Status::Complete);
        assert!(state.is_degraded());
        assert_eq!(state.errors()[0].stage, "repo_analyzer");
        assert!(state.structure_signals.is_all_absent());
        assert!(state.keywords.is_empty());
        let report = state.final_report().unwrap();
        assert!(report.contains("fallback data"));
    }

    #[tokio::test]
    async fn abort_at_tag_review_stops_the_run() {
        let fixture = Fixture::new(
            ScriptedFetcher::ok(README),
            vec![Decision::Approve, Decision::Abort],
        );
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();
        let state = &outcome.state;

        assert_eq!(state.status(), Status::Aborted);
        assert_eq!(outcome.exit_code(), exit_codes::ABORTED);
        assert!(state.final_report().is_none());
        assert!(state.improved_title.is_none());
        assert!(fixture.generator.purposes().is_empty());
        assert_eq!(state.checkpoint_log().len(), 2);
        assert_eq!(state.checkpoint_log()[1].decision, DecisionKind::Abort);
        assert_eq!(fixture.sink.stored()[0].status(), Status::Aborted);
    }

    #[tokio::test]
    async fn edits_are_applied_verbatim() {
        let fixture = Fixture::new(
            ScriptedFetcher::ok(README),
            vec![
                Decision::Approve,
                Decision::Edit("cli, parsing".to_string()),
                Decision::Edit("My own introduction.".to_string()),
            ],
        );
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();
        let state = &outcome.state;

        assert_eq!(state.status(), Status::Complete);
        assert_eq!(state.improved_intro.as_deref(), Some("My own introduction."));
        let tags: Vec<&str> = state.suggested_tags.iter().map(String::as_str).collect();
        assert_eq!(tags, vec!["cli", "parsing"]);
        assert_eq!(
            state.checkpoint_log()[2].edited_text.as_deref(),
            Some("My own introduction.")
        );
        assert!(state.final_report().unwrap().contains("My own introduction."));
    }

    #[tokio::test]
    async fn edited_readme_feeds_later_stages() {
        let fixture = Fixture::new(
            ScriptedFetcher::ok(README),
            vec![Decision::Edit("# Widget\n\nwidget widget gadget".to_string())],
        );
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();
        let state = &outcome.state;

        assert_eq!(state.keywords[0].term, "widget");
        assert_eq!(state.raw_readme.as_deref(), Some(README));
    }

    #[tokio::test]
    async fn empty_readme_still_completes() {
        let fixture = Fixture::new(ScriptedFetcher::ok(""), vec![]);
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();
        let state = &outcome.state;

        assert_eq!(state.status(), Status::Complete);
        assert!(state.errors().is_empty());
        assert!(state.is_degraded());
        assert!(state.structure_signals.is_all_absent());
        assert_eq!(state.missing_sections.len(), 5);
        assert!(state
            .final_report()
            .is_some_and(|r| r.contains("This run was degraded")));
    }

    #[tokio::test]
    async fn non_interactive_decisions_are_marked_defaulted() {
        let fixture = Fixture::new(ScriptedFetcher::ok(README), vec![]);
        let outcome = fixture
            .with_mode(CheckpointMode::non_interactive())
            .run("acme/demo-parser")
            .await
            .unwrap();

        assert_eq!(outcome.state.status(), Status::Complete);
        assert!(fixture.input.asked().is_empty());
        assert!(outcome
            .state
            .checkpoint_log()
            .iter()
            .all(|r| r.decision == DecisionKind::Approve && r.source == DecisionSource::Defaulted));
    }

    #[tokio::test]
    async fn non_interactive_abort_default_stops_at_first_checkpoint() {
        let fixture = Fixture::new(ScriptedFetcher::ok(README), vec![]);
        let outcome = fixture
            .with_mode(CheckpointMode::NonInteractive {
                default: Decision::Abort,
            })
            .run("acme/demo-parser")
            .await
            .unwrap();

        assert_eq!(outcome.state.status(), Status::Aborted);
        assert_eq!(outcome.state.checkpoint_log().len(), 1);
    }

    #[tokio::test]
    async fn invalid_edits_are_reasked_then_defaulted() {
        let bad = || Decision::Edit("Not A Tag!".to_string());
        let fixture = Fixture::new(
            ScriptedFetcher::ok(README),
            vec![Decision::Approve, bad(), bad(), bad()],
        );
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();
        let state = &outcome.state;

        let tag_prompts = fixture
            .input
            .asked()
            .iter()
            .filter(|(c, _)| *c == CheckpointName::TagReview)
            .count();
        assert_eq!(tag_prompts, 3);
        assert_eq!(state.errors().len(), 3);
        assert!(state.errors().iter().all(|e| e.kind == ErrorKind::Validation));
        assert!(!state.is_degraded());
        assert_eq!(
            decisions(state)[1],
            (CheckpointName::TagReview, DecisionKind::Approve, DecisionSource::Defaulted)
        );
        assert_eq!(state.status(), Status::Complete);
    }

    #[tokio::test]
    async fn input_failure_aborts() {
        let fixture = Fixture::new(ScriptedFetcher::ok(README), vec![]);
        let input = Arc::new(ScriptedInput::new(vec![Err(AppError::HumanInput(
            "terminal closed".to_string(),
        ))]));
        let outcome = fixture
            .with_mode(CheckpointMode::Interactive(input))
            .run("acme/demo-parser")
            .await
            .unwrap();
        let state = &outcome.state;

        assert_eq!(state.status(), Status::Aborted);
        assert_eq!(state.errors()[0].kind, ErrorKind::HumanInput);
        assert_eq!(
            decisions(state),
            vec![(CheckpointName::ReadmeReview, DecisionKind::Abort, DecisionSource::Defaulted)]
        );
    }

    #[tokio::test]
    async fn invalid_reference_fails_before_any_stage() {
        let fixture = Fixture::new(ScriptedFetcher::ok(README), vec![]);
        let result = fixture.orchestrator().run("not a repo").await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(fixture.fetcher.calls(), 0);
        assert!(fixture.sink.stored().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_keeps_terminal_state() {
        let fixture = Fixture {
            sink: Arc::new(MemorySink::failing()),
            ..Fixture::new(ScriptedFetcher::ok(README), vec![])
        };
        let outcome = fixture.orchestrator().run("acme/demo-parser").await.unwrap();

        assert_eq!(outcome.state.status(), Status::Complete);
        assert!(outcome.location.is_none());
        assert!(outcome.storage_error.is_some_and(|e| e.contains("disk full")));
    }

    #[tokio::test]
    async fn human_feedback_reaches_the_report() {
        let fixture = Fixture::new(ScriptedFetcher::ok(README), vec![]);
        let outcome = fixture
            .orchestrator()
            .with_human_feedback(Some("Add a benchmark table.".to_string()))
            .run("acme/demo-parser")
            .await
            .unwrap();

        assert!(outcome
            .state
            .final_report()
            .unwrap()
            .contains("## Human feedback\n\nAdd a benchmark table."));
    }

    struct Trespasser;

    #[async_trait]
    impl Stage for Trespasser {
        fn name(&self) -> StageName {
            StageName::ContentImprover
        }

        fn owns(&self) -> &'static [Field] {
            &[Field::ImprovedTitle]
        }

        async fn run(&self, mut state: WorkflowState, _ctx: &StageContext<'_>) -> WorkflowState {
            state.improved_title = Some("Mine".to_string());
            state.keywords.clear();
            state
        }
    }

    #[tokio::test]
    async fn foreign_writes_are_reverted() {
        let mut before = WorkflowState::new(validate("acme/demo-parser").unwrap());
        before.transition(Status::Analyzing).unwrap();
        before.keywords = vec![Keyword {
            term: "parser".to_string(),
            score: 1.0,
        }];

        let harness = crate::test_support::Harness::default();
        let after = Trespasser.run(before.clone(), &harness.context()).await;
        let state = enforce_ownership(&Trespasser, &before, after);

        assert_eq!(state.improved_title.as_deref(), Some("Mine"));
        assert_eq!(state.keywords, before.keywords);
        assert_eq!(state.status(), Status::Degraded);
        assert_eq!(state.errors()[0].kind, ErrorKind::Contract);
    }

    struct Eraser;

    #[async_trait]
    impl Stage for Eraser {
        fn name(&self) -> StageName {
            StageName::TagRecommender
        }

        fn owns(&self) -> &'static [Field] {
            &[Field::Keywords, Field::SuggestedTags]
        }

        async fn run(&self, mut state: WorkflowState, _ctx: &StageContext<'_>) -> WorkflowState {
            state.keywords.clear();
            state.suggested_tags = ["grammar".to_string()].into_iter().collect();
            state
        }
    }

    #[tokio::test]
    async fn clearing_a_populated_owned_field_is_reverted() {
        let mut before = WorkflowState::new(validate("acme/demo-parser").unwrap());
        before.transition(Status::Analyzing).unwrap();
        before.keywords = vec![Keyword {
            term: "parser".to_string(),
            score: 1.0,
        }];

        let harness = crate::test_support::Harness::default();
        let after = Eraser.run(before.clone(), &harness.context()).await;
        let state = enforce_ownership(&Eraser, &before, after);

        assert_eq!(state.keywords, before.keywords);
        assert!(state.suggested_tags.contains("grammar"));
        assert_eq!(state.status(), Status::Degraded);
        assert_eq!(state.errors().len(), 1);
        assert_eq!(state.errors()[0].kind, ErrorKind::Contract);
        assert!(state.errors()[0].message.contains("cleared keywords"));
    }
}
