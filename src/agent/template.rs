use async_trait::async_trait;

use crate::agent::prompt::PromptContext;
use crate::agent::{GenerationPurpose, TextGenerator};
use crate::error::Result;

/// Offline generator used when no language model is configured.
///
/// Output is built only from the prompt context, so it is deterministic.
pub struct TemplateGenerator;

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        let text = match context.purpose {
            GenerationPurpose::Title => title(context),
            GenerationPurpose::Intro => intro(context),
            GenerationPurpose::Report => summary(context),
        };
        Ok(text)
    }
}

/// `my_cool-repo` -> `My Cool Repo`
pub fn humanize(name: &str) -> String {
    name.split(|c: char| c == '-' || c == '_' || c == '.' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn title(context: &PromptContext) -> String {
    let base = context
        .current_title
        .clone()
        .unwrap_or_else(|| humanize(&context.repo_name));
    match context.keywords.first() {
        Some(keyword) if !base.to_lowercase().contains(keyword.as_str()) => {
            format!("{base}: {}", humanize(keyword))
        }
        _ => base,
    }
}

fn intro(context: &PromptContext) -> String {
    let name = context
        .current_title
        .clone()
        .unwrap_or_else(|| humanize(&context.repo_name));
    let mut sentences = vec![format!("{name} is an open-source project hosted at `{}`.", context.repo)];
    if !context.keywords.is_empty() {
        let focus: Vec<&str> = context.keywords.iter().take(3).map(String::as_str).collect();
        sentences.push(format!("It focuses on {}.", focus.join(", ")));
    }
    if !context.missing_sections.is_empty() {
        sentences.push(format!(
            "The README would benefit from {} sections.",
            context.missing_sections.join(", ")
        ));
    }
    sentences.push("Read on to learn how to install it and get started.".to_string());
    sentences.join(" ")
}

fn summary(context: &PromptContext) -> String {
    let mut parts = vec![format!("This review covers `{}`.", context.repo)];
    if let Some(title) = &context.improved_title {
        parts.push(format!("Consider retitling the project to \"{title}\"."));
    }
    if !context.missing_sections.is_empty() {
        parts.push(format!(
            "Adding {} sections should be the first priority.",
            context.missing_sections.join(", ")
        ));
    }
    if !context.tags.is_empty() {
        parts.push(format!("Tag the repository with {}.", context.tags.join(", ")));
    }
    parts.join(" ")
}
