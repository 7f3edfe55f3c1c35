use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use pulldown_cmark::{Event, Parser, Tag, TagEnd, TextMergeStream};

use crate::error::Result;
use crate::workflow::state::Keyword;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "all", "also", "am", "an", "and", "any", "are", "as",
    "at", "be", "because", "been", "before", "being", "below", "between", "both", "but", "by",
    "can", "could", "did", "do", "does", "doing", "down", "during", "each", "etc", "few", "for",
    "from", "further", "get", "had", "has", "have", "having", "he", "her", "here", "hers", "him",
    "his", "how", "i", "if", "in", "into", "is", "it", "its", "itself", "just", "like", "make",
    "may", "me", "more", "most", "must", "my", "no", "nor", "not", "now", "of", "off", "on",
    "once", "one", "only", "or", "other", "our", "ours", "out", "over", "own", "same", "see",
    "she", "should", "so", "some", "such", "than", "that", "the", "their", "them", "then",
    "there", "these", "they", "this", "those", "through", "to", "too", "under", "until", "up",
    "use", "used", "uses", "using", "very", "via", "was", "we", "were", "what", "when", "where",
    "which", "while", "who", "why", "will", "with", "would", "you", "your", "yours",
];

/// Weight applied to terms that appear in headings or the first paragraph.
const PROMINENCE_BOOST: f64 = 2.0;

#[async_trait]
pub trait KeywordExtractor: Send + Sync {
    /// Ranked `(term, score)` pairs, best first. Empty input yields an empty
    /// sequence, never an error.
    async fn extract(&self, text: &str) -> Result<Vec<Keyword>>;
}

/// Frequency-based extractor with a boost for prominent terms.
pub struct FrequencyExtractor {
    top_k: usize,
}

impl FrequencyExtractor {
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    pub fn rank(&self, text: &str) -> Vec<Keyword> {
        if text.trim().is_empty() || self.top_k == 0 {
            return Vec::new();
        }

        let mut counts: HashMap<String, f64> = HashMap::new();
        let mut in_code_block = false;
        let mut in_heading = false;
        let mut in_first_paragraph = false;
        let mut seen_paragraph = false;

        for event in TextMergeStream::new(Parser::new(text)) {
            match event {
                Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
                Event::End(TagEnd::CodeBlock) => in_code_block = false,
                Event::Start(Tag::Heading { .. }) => in_heading = true,
                Event::End(TagEnd::Heading(_)) => in_heading = false,
                Event::Start(Tag::Paragraph) if !seen_paragraph => {
                    seen_paragraph = true;
                    in_first_paragraph = true;
                }
                Event::End(TagEnd::Paragraph) => in_first_paragraph = false,
                Event::Text(chunk) | Event::Code(chunk) if !in_code_block => {
                    let weight = if in_heading || in_first_paragraph {
                        PROMINENCE_BOOST
                    } else {
                        1.0
                    };
                    for token in tokens(&chunk) {
                        *counts.entry(token).or_default() += weight;
                    }
                }
                _ => {}
            }
        }

        let max = counts.values().cloned().fold(0.0_f64, f64::max);
        if max == 0.0 {
            return Vec::new();
        }

        let mut ranked: Vec<Keyword> = counts
            .into_iter()
            .map(|(term, count)| Keyword {
                term,
                score: (count / max * 1000.0).round() / 1000.0,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.term.cmp(&b.term))
        });
        ranked.truncate(self.top_k);
        ranked
    }
}

#[async_trait]
impl KeywordExtractor for FrequencyExtractor {
    async fn extract(&self, text: &str) -> Result<Vec<Keyword>> {
        Ok(self.rank(text))
    }
}

fn tokens(line: &str) -> impl Iterator<Item = String> + '_ {
    line.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '+'))
        .map(|t| t.trim_matches(|c: char| c == '-' || c == '_').to_lowercase())
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| !t.chars().all(|c| c.is_ascii_digit()))
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
}

/// Turn a keyword into a tag: lowercase, whitespace to `-`, only `[a-z0-9-]`.
pub fn slugify(term: &str) -> String {
    let mut slug = String::with_capacity(term.len());
    for c in term.trim().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if (c.is_whitespace() || c == '-' || c == '_') && !slug.ends_with('-') {
            slug.push('-');
        } else if c == '+' {
            slug.push_str("plus");
        }
    }
    slug.trim_matches('-').to_string()
}

pub fn is_valid_tag(tag: &str) -> bool {
    (2..=35).contains(&tag.len())
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !tag.starts_with('-')
        && !tag.ends_with('-')
}

/// Derive up to `max_tags` tags from ranked keywords, keeping rank order
/// for the cut.
pub fn tags_from_keywords(keywords: &[Keyword], max_tags: usize) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    for keyword in keywords {
        if tags.len() >= max_tags {
            break;
        }
        let tag = slugify(&keyword.term);
        if is_valid_tag(&tag) {
            tags.insert(tag);
        }
    }
    tags
}
