use crate::agent::GenerationPurpose;
use crate::workflow::state::WorkflowState;

/// README characters included in a prompt.
pub const EXCERPT_CHARS: usize = 1200;
/// Keywords included in a prompt.
pub const PROMPT_KEYWORDS: usize = 20;

/// Everything a generator may use for one call, snapshotted from the
/// workflow state so no generator ever touches the state itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptContext {
    pub purpose: GenerationPurpose,
    pub repo: String,
    pub repo_name: String,
    pub current_title: Option<String>,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub missing_sections: Vec<String>,
    pub readme_excerpt: String,
    pub improved_title: Option<String>,
    pub improved_intro: Option<String>,
    /// Report assembled so far (reviewer only).
    pub draft: Option<String>,
}

impl PromptContext {
    pub fn from_state(purpose: GenerationPurpose, state: &WorkflowState) -> Self {
        let reference = state.repo_reference();
        Self {
            purpose,
            repo: reference.full_name(),
            repo_name: reference.name().to_string(),
            current_title: state.structure_signals.title.clone(),
            keywords: state
                .keywords
                .iter()
                .take(PROMPT_KEYWORDS)
                .map(|k| k.term.clone())
                .collect(),
            tags: state.suggested_tags.iter().cloned().collect(),
            missing_sections: state.missing_sections.iter().cloned().collect(),
            readme_excerpt: excerpt(state.text()),
            improved_title: state.improved_title.clone(),
            improved_intro: state.improved_intro.clone(),
            draft: None,
        }
    }

    pub fn with_draft(mut self, draft: String) -> Self {
        self.draft = Some(draft);
        self
    }

    /// Render the user prompt sent to a language model.
    pub fn render(&self) -> String {
        match self.purpose {
            GenerationPurpose::Title => self.title_prompt(),
            GenerationPurpose::Intro => self.intro_prompt(),
            GenerationPurpose::Report => self.report_prompt(),
        }
    }

    fn title_prompt(&self) -> String {
        format!(
            r#"Suggest one improved title for the GitHub project `{repo}`.

Current title: {current}
Keywords: {keywords}
Tags: {tags}

README:
{readme}

Reply with the title only, on a single line, without quotes or Markdown."#,
            repo = self.repo,
            current = self.current_title.as_deref().unwrap_or("(no title heading)"),
            keywords = list_or_none(&self.keywords),
            tags = list_or_none(&self.tags),
            readme = self.readme_block(),
        )
    }

    fn intro_prompt(&self) -> String {
        format!(
            r#"Write an improved introduction (3-5 sentences) for the README of `{repo}`.
Explain what the project does, who it is for, and why it is useful.

Keywords: {keywords}
Tags: {tags}
Sections the README is missing: {missing}

README:
{readme}

Reply with the introduction paragraph only."#,
            repo = self.repo,
            keywords = list_or_none(&self.keywords),
            tags = list_or_none(&self.tags),
            missing = list_or_none(&self.missing_sections),
            readme = self.readme_block(),
        )
    }

    fn report_prompt(&self) -> String {
        format!(
            r#"You are reviewing the README of `{repo}` for publication.
Below is a draft improvement report. Write a short review summary (3-5 sentences)
that prioritises the most valuable changes and says whether the 2-4 suggested
categories fit the project. Mention explicitly when a part of the draft is marked
as fallback or skipped.

Draft report:
{draft}

Reply with the summary paragraph only."#,
            repo = self.repo,
            draft = self.draft.as_deref().unwrap_or("(empty)"),
        )
    }

    fn readme_block(&self) -> &str {
        if self.readme_excerpt.is_empty() {
            "(README content unavailable)"
        } else {
            &self.readme_excerpt
        }
    }
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(EXCERPT_CHARS).collect();
    cut.push_str("\n[...]");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::validate::validate;

    #[test]
    fn prompts_mention_repo_and_degrade_gracefully() {
        let state = WorkflowState::new(validate("owner/repo").unwrap());
        let title = PromptContext::from_state(GenerationPurpose::Title, &state).render();
        assert!(title.contains("`owner/repo`"));
        assert!(title.contains("(README content unavailable)"));
        assert!(title.contains("Tags: (none)"));
    }

    #[test]
    fn long_readmes_are_excerpted() {
        let mut state = WorkflowState::new(validate("owner/repo").unwrap());
        state.working_text = Some("x".repeat(EXCERPT_CHARS * 2));
        let context = PromptContext::from_state(GenerationPurpose::Intro, &state);
        assert!(context.readme_excerpt.ends_with("[...]"));
        assert!(context.render().len() < EXCERPT_CHARS * 2);
    }

    #[test]
    fn report_prompt_embeds_draft() {
        let state = WorkflowState::new(validate("owner/repo").unwrap());
        let prompt = PromptContext::from_state(GenerationPurpose::Report, &state)
            .with_draft("## Suggested title\nDemo".to_string())
            .render();
        assert!(prompt.contains("## Suggested title\nDemo"));
        assert!(prompt.contains("2-4 suggested\ncategories"));
    }
}
