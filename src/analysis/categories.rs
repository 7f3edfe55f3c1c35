use crate::workflow::state::Keyword;

pub const MIN_CATEGORIES: usize = 2;
pub const MAX_CATEGORIES: usize = 4;

/// Broad project categories and the terms that point at each one.
pub const CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Machine Learning",
        &[
            "ai", "ml", "machine-learning", "model", "models", "neural", "training",
            "inference", "llm", "llms", "deep-learning", "pytorch", "tensorflow",
            "transformer", "transformers", "embedding", "embeddings", "agent", "agents",
        ],
    ),
    (
        "Developer Tools",
        &[
            "cli", "tool", "tools", "tooling", "developer", "build", "compiler", "parser",
            "parsers", "grammar", "linter", "debugger", "sdk", "plugin", "editor", "library",
        ],
    ),
    (
        "Web Development",
        &[
            "web", "http", "server", "api", "rest", "frontend", "backend", "react",
            "framework", "browser", "html", "css", "graphql",
        ],
    ),
    (
        "Data Processing",
        &[
            "data", "dataset", "datasets", "pipeline", "etl", "database", "sql", "analytics",
            "csv", "query", "storage", "stream", "streaming",
        ],
    ),
    (
        "DevOps",
        &[
            "docker", "kubernetes", "deploy", "deployment", "cloud", "infrastructure",
            "container", "containers", "monitoring", "terraform",
        ],
    ),
    (
        "Security",
        &[
            "security", "crypto", "cryptography", "auth", "authentication", "encryption",
            "vulnerability", "secrets",
        ],
    ),
    (
        "Automation",
        &["automation", "bot", "bots", "workflow", "workflows", "scheduler", "cron"],
    ),
    (
        "Documentation",
        &["docs", "documentation", "readme", "markdown", "writing"],
    ),
];

/// Used to pad the list when the keywords point at fewer than two categories.
const DEFAULT_CATEGORIES: &[&str] = &["Developer Tools", "Open Source"];

/// Suggest between two and four categories from ranked keywords and tags.
///
/// A category scores the summed keyword scores of its matching terms, plus
/// one per matching tag. Ties keep table order.
pub fn suggest_categories<'a>(
    keywords: &[Keyword],
    tags: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let tags: Vec<&String> = tags.into_iter().collect();

    let mut scored: Vec<(usize, f64)> = CATEGORIES
        .iter()
        .enumerate()
        .map(|(index, (_, terms))| {
            let from_keywords: f64 = keywords
                .iter()
                .filter(|k| terms.contains(&k.term.to_lowercase().as_str()))
                .map(|k| k.score)
                .sum();
            let from_tags = tags
                .iter()
                .filter(|tag| {
                    terms.contains(&tag.as_str())
                        || tag.split('-').any(|part| terms.contains(&part))
                })
                .count() as f64;
            (index, from_keywords + from_tags)
        })
        .filter(|(_, score)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut out: Vec<String> = scored
        .into_iter()
        .take(MAX_CATEGORIES)
        .map(|(index, _)| CATEGORIES[index].0.to_string())
        .collect();
    for default in DEFAULT_CATEGORIES {
        if out.len() >= MIN_CATEGORIES {
            break;
        }
        if !out.iter().any(|c| c == default) {
            out.push(default.to_string());
        }
    }
    out
}
