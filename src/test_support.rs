use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::agent::prompt::PromptContext;
use crate::agent::{GenerationPurpose, TextGenerator};
use crate::analysis::keywords::{FrequencyExtractor, KeywordExtractor};
use crate::error::{AppError, Result};
use crate::platform::ContentFetcher;
use crate::storage::ReportSink;
use crate::workflow::checkpoint::{CheckpointName, Decision, HumanInput};
use crate::workflow::retry::RetryPolicy;
use crate::workflow::stages::{StageContext, StageLimits};
use crate::workflow::state::{Keyword, WorkflowState};
use crate::workflow::validate::RepoReference;

pub const README: &str = "# Demo Parser\n\nA parser toolkit for building fast parsers in Rust.\n\n## Overview\n\nThe parser ships a grammar DSL.\n\n## Usage\n\nRun the parser on a grammar file.\n\n## Contributing\n\nPull requests welcome.\n";

/// Zero-delay policy with the default attempt budget.
pub fn retry() -> RetryPolicy {
    RetryPolicy::immediate(3)
}

type FetchScript = Box<dyn Fn(u32) -> Result<String> + Send + Sync>;

/// Fetcher driven by a closure over the 0-based call number.
pub struct ScriptedFetcher {
    script: FetchScript,
    calls: AtomicU32,
}

impl ScriptedFetcher {
    pub fn new(script: impl Fn(u32) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            calls: AtomicU32::new(0),
        }
    }

    pub fn ok(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Fails with a retryable network error `failures` times, then succeeds.
    pub fn flaky(failures: u32, text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |n| {
            if n < failures {
                Err(AppError::Network(format!("connection reset ({n})")))
            } else {
                Ok(text.clone())
            }
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentFetcher for ScriptedFetcher {
    async fn fetch(&self, _repo: &RepoReference) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(n)
    }
}

/// Extractor that always fails with a fatal error.
pub struct FailingExtractor;

#[async_trait]
impl KeywordExtractor for FailingExtractor {
    async fn extract(&self, _text: &str) -> Result<Vec<Keyword>> {
        Err(AppError::Extraction("model unavailable".to_string()))
    }
}

type GenerateScript = Box<dyn Fn(GenerationPurpose) -> Result<String> + Send + Sync>;

/// Generator that records the purpose of every call.
pub struct ScriptedGenerator {
    script: GenerateScript,
    purposes: Mutex<Vec<GenerationPurpose>>,
}

impl ScriptedGenerator {
    pub fn new(script: impl Fn(GenerationPurpose) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            purposes: Mutex::new(Vec::new()),
        }
    }

    pub fn canned() -> Self {
        Self::new(|purpose| {
            Ok(match purpose {
                GenerationPurpose::Title => "\"# Demo Parser: Fast Grammars\"\nextra line".to_string(),
                GenerationPurpose::Intro => "Demo Parser turns grammars into fast parsers.".to_string(),
                GenerationPurpose::Report => "Add installation and license sections first.".to_string(),
            })
        })
    }

    pub fn failing() -> Self {
        Self::new(|_| Err(AppError::GenerationAuth("invalid x-api-key".to_string())))
    }

    pub fn purposes(&self) -> Vec<GenerationPurpose> {
        self.purposes.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        self.purposes.lock().unwrap().push(context.purpose);
        (self.script)(context.purpose)
    }
}

/// Human input answering from a queue; approves once the queue is empty.
pub struct ScriptedInput {
    answers: Mutex<VecDeque<Result<Decision>>>,
    asked: Mutex<Vec<(CheckpointName, String)>>,
}

impl ScriptedInput {
    pub fn new(answers: Vec<Result<Decision>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            asked: Mutex::new(Vec::new()),
        }
    }

    pub fn decisions(decisions: Vec<Decision>) -> Self {
        Self::new(decisions.into_iter().map(Ok).collect())
    }

    pub fn asked(&self) -> Vec<(CheckpointName, String)> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl HumanInput for ScriptedInput {
    async fn ask(&self, checkpoint: CheckpointName, proposed: &str) -> Result<Decision> {
        self.asked
            .lock()
            .unwrap()
            .push((checkpoint, proposed.to_string()));
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(Decision::Approve))
    }
}

/// Sink capturing every stored state.
#[derive(Default)]
pub struct MemorySink {
    stored: Mutex<Vec<WorkflowState>>,
    fail: bool,
}

impl MemorySink {
    pub fn failing() -> Self {
        Self {
            stored: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn stored(&self) -> Vec<WorkflowState> {
        self.stored.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn store(&self, state: &WorkflowState) -> Result<String> {
        if self.fail {
            return Err(AppError::Storage("disk full".to_string()));
        }
        self.stored.lock().unwrap().push(state.clone());
        Ok(format!("memory://{}", state.repo_reference()))
    }
}

/// Owned collaborators from which a `StageContext` can be borrowed.
pub struct Harness {
    pub retry: RetryPolicy,
    pub fetcher: ScriptedFetcher,
    pub extractor: Box<dyn KeywordExtractor>,
    pub generator: ScriptedGenerator,
    pub limits: StageLimits,
}

impl Default for Harness {
    fn default() -> Self {
        Self {
            retry: retry(),
            fetcher: ScriptedFetcher::ok(README),
            extractor: Box::new(FrequencyExtractor::new(10)),
            generator: ScriptedGenerator::canned(),
            limits: StageLimits::default(),
        }
    }
}

impl Harness {
    pub fn context(&self) -> StageContext<'_> {
        StageContext {
            retry: &self.retry,
            fetcher: &self.fetcher,
            extractor: self.extractor.as_ref(),
            generator: &self.generator,
            limits: self.limits,
        }
    }
}
