use std::collections::{BTreeMap, BTreeSet};

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

use crate::workflow::state::StructureSignals;

/// Sections every README is expected to carry, with the headings that count
/// as each one.
pub const STANDARD_SECTIONS: &[(&str, &[&str])] = &[
    ("introduction", &["introduction", "intro", "overview", "about", "description", "summary"]),
    ("installation", &["installation", "install", "installing", "setup", "getting started"]),
    ("usage", &["usage", "examples", "example", "quick start", "quickstart", "how to use"]),
    ("contributing", &["contributing", "contribution", "contributions", "development"]),
    ("license", &["license", "licence", "licensing"]),
];

/// A Markdown heading found outside code blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

/// Collect ATX (`# Title`) and Setext (`Title\n===`) headings.
pub fn headings(markdown: &str) -> Vec<Heading> {
    let mut out = Vec::new();
    let mut current: Option<Heading> = None;

    for event in Parser::new(markdown) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                current = Some(Heading {
                    level: level as u8,
                    text: String::new(),
                });
            }
            Event::Text(text) | Event::Code(text) => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push_str(&text);
                }
            }
            Event::SoftBreak | Event::HardBreak => {
                if let Some(heading) = current.as_mut() {
                    heading.text.push(' ');
                }
            }
            Event::End(TagEnd::Heading(_)) => {
                if let Some(mut heading) = current.take() {
                    heading.text = heading.text.trim().to_string();
                    if !heading.text.is_empty() {
                        out.push(heading);
                    }
                }
            }
            _ => {}
        }
    }

    out
}

/// Map a heading to the standard section it represents, if any.
pub fn classify_heading(heading: &str) -> Option<&'static str> {
    let normalized: String = heading
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    let normalized = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    STANDARD_SECTIONS.iter().find_map(|(section, aliases)| {
        aliases
            .iter()
            .any(|alias| normalized == *alias || normalized.starts_with(&format!("{alias} ")))
            .then_some(*section)
    })
}

/// Every standard section marked absent, zero density.
pub fn all_absent() -> StructureSignals {
    StructureSignals {
        sections: STANDARD_SECTIONS
            .iter()
            .map(|(name, _)| (name.to_string(), false))
            .collect(),
        word_density: 0.0,
        headings: Vec::new(),
        title: None,
    }
}

/// Compute structure signals for sanitized README text.
pub fn analyze(markdown: &str) -> StructureSignals {
    if markdown.trim().is_empty() {
        return all_absent();
    }

    let found = headings(markdown);
    let present: BTreeSet<&str> = found
        .iter()
        .filter_map(|h| classify_heading(&h.text))
        .collect();

    let sections: BTreeMap<String, bool> = STANDARD_SECTIONS
        .iter()
        .map(|(name, _)| (name.to_string(), present.contains(name)))
        .collect();

    let lines = markdown.lines().filter(|l| !l.trim().is_empty()).count();
    let words = markdown.split_whitespace().count();
    let word_density = if lines == 0 {
        0.0
    } else {
        words as f64 / lines as f64
    };

    StructureSignals {
        sections,
        word_density,
        title: found.iter().find(|h| h.level == 1).map(|h| h.text.clone()),
        headings: found.into_iter().map(|h| h.text).collect(),
    }
}

/// Standard sections marked absent in `signals`.
pub fn missing_sections(signals: &StructureSignals) -> BTreeSet<String> {
    let mut missing: BTreeSet<String> = signals
        .sections
        .iter()
        .filter(|(_, present)| !**present)
        .map(|(name, _)| name.clone())
        .collect();
    if signals.sections.is_empty() {
        missing.extend(STANDARD_SECTIONS.iter().map(|(name, _)| name.to_string()));
    }
    missing
}
