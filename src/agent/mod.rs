pub mod claude;
pub mod prompt;
pub mod template;

use async_trait::async_trait;

use crate::error::Result;
use prompt::PromptContext;

/// What a generation call is for. Used in prompts, logs and test fakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GenerationPurpose {
    Title,
    Intro,
    Report,
}

impl GenerationPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationPurpose::Title => "title",
            GenerationPurpose::Intro => "intro",
            GenerationPurpose::Report => "report",
        }
    }
}

impl std::fmt::Display for GenerationPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce the text described by `context.purpose`.
    async fn generate(&self, context: &PromptContext) -> Result<String>;
}
