use async_trait::async_trait;

use crate::analysis::keywords::tags_from_keywords;
use crate::workflow::stages::{degrade, Stage, StageContext, StageName};
use crate::workflow::state::{Field, WorkflowState};

/// Extracts ranked keywords and turns them into repository tags.
pub struct TagRecommender;

#[async_trait]
impl Stage for TagRecommender {
    fn name(&self) -> StageName {
        StageName::TagRecommender
    }

    fn owns(&self) -> &'static [Field] {
        &[Field::Keywords, Field::SuggestedTags]
    }

    async fn run(&self, mut state: WorkflowState, ctx: &StageContext<'_>) -> WorkflowState {
        if state.text().is_empty() {
            tracing::info!("No README text, skipping keyword extraction");
            state.keywords = Vec::new();
            state.suggested_tags.clear();
            state.mark_fallback(Field::Keywords);
            state.mark_fallback(Field::SuggestedTags);
            return state;
        }

        let extracted = ctx.extract_keywords(state.text()).await;
        match extracted {
            Ok(keywords) => state.keywords = keywords,
            Err(e) => {
                degrade(&mut state, self.name(), &e);
                state.keywords = Vec::new();
                state.mark_fallback(Field::Keywords);
                state.mark_fallback(Field::SuggestedTags);
            }
        }

        state.suggested_tags = tags_from_keywords(&state.keywords, ctx.limits.max_tags);
        tracing::info!(
            keywords = state.keywords.len(),
            tags = state.suggested_tags.len(),
            "Tags recommended"
        );
        state
    }
}
