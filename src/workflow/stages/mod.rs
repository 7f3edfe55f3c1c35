pub mod analyzer;
pub mod content;
pub mod reviewer;
pub mod tags;

use async_trait::async_trait;

use crate::agent::prompt::PromptContext;
use crate::agent::TextGenerator;
use crate::analysis::keywords::KeywordExtractor;
use crate::error::{AppError, ErrorClass};
use crate::platform::ContentFetcher;
use crate::workflow::retry::{FatalError, RetryPolicy};
use crate::workflow::state::{Field, Keyword, WorkflowState};
use crate::workflow::validate::{sanitize, RepoReference};

pub use analyzer::RepoAnalyzer;
pub use content::ContentImprover;
pub use reviewer::Reviewer;
pub use tags::TagRecommender;

/// Upper bound for any generated or edited paragraph.
pub const MAX_GENERATED_CHARS: usize = 4000;
/// Upper bound for a generated title.
pub const MAX_TITLE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageName {
    RepoAnalyzer,
    TagRecommender,
    ContentImprover,
    Reviewer,
}

impl StageName {
    pub fn as_str(self) -> &'static str {
        match self {
            StageName::RepoAnalyzer => "repo_analyzer",
            StageName::TagRecommender => "tag_recommender",
            StageName::ContentImprover => "content_improver",
            StageName::Reviewer => "reviewer",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StageLimits {
    pub max_readme_chars: usize,
    pub max_tags: usize,
}

impl Default for StageLimits {
    fn default() -> Self {
        Self {
            max_readme_chars: 20_000,
            max_tags: 8,
        }
    }
}

/// External capabilities handed to a stage for the duration of one call.
///
/// Every method runs the underlying collaborator through the orchestrator's
/// retry policy; stages never retry on their own.
pub struct StageContext<'a> {
    pub(crate) retry: &'a RetryPolicy,
    pub(crate) fetcher: &'a dyn ContentFetcher,
    pub(crate) extractor: &'a dyn KeywordExtractor,
    pub(crate) generator: &'a dyn TextGenerator,
    pub limits: StageLimits,
}

impl<'a> StageContext<'a> {
    pub async fn fetch_readme(&self, repo: &RepoReference) -> Result<String, FatalError> {
        let fetcher = self.fetcher;
        self.retry
            .execute("fetch_readme", move || fetcher.fetch(repo), AppError::class)
            .await
    }

    pub async fn extract_keywords(&self, text: &str) -> Result<Vec<Keyword>, FatalError> {
        let extractor = self.extractor;
        self.retry
            .execute("extract_keywords", move || extractor.extract(text), AppError::class)
            .await
    }

    /// Generate text and sanitize it. Output that is empty after
    /// sanitizing counts as a fatal malformed response.
    pub async fn generate(
        &self,
        context: &PromptContext,
        max_chars: usize,
    ) -> Result<String, FatalError> {
        let generator = self.generator;
        let name = format!("generate_{}", context.purpose);
        self.retry
            .execute(
                &name,
                move || async move {
                    let text = generator.generate(context).await?;
                    let cleaned = sanitize(Some(&text), max_chars);
                    if cleaned.is_empty() {
                        return Err(AppError::MalformedOutput(format!(
                            "empty {} from generator",
                            context.purpose
                        )));
                    }
                    Ok(cleaned)
                },
                |e: &AppError| match e {
                    AppError::MalformedOutput(_) => ErrorClass::Fatal,
                    other => other.class(),
                },
            )
            .await
    }
}

/// One analysis step. Reads fields set by earlier stages and writes only
/// the fields it owns.
#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> StageName;

    fn owns(&self) -> &'static [Field];

    /// Unrecovered capability failures are recorded on the state together
    /// with a local fallback value; they never escape this call.
    async fn run(&self, state: WorkflowState, ctx: &StageContext<'_>) -> WorkflowState;
}

/// Record an unrecovered capability failure and degrade the run.
pub(crate) fn degrade(state: &mut WorkflowState, stage: StageName, error: &FatalError) {
    tracing::warn!(stage = %stage, error = %error, "Using fallback value");
    state.record_failure(stage.as_str(), error.source.kind(), error.to_string());
}
