use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

static OWNER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,37}[A-Za-z0-9])?$").unwrap());

static NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,100}$").unwrap());

/// A validated `owner/name` pair. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoReference {
    owner: String,
    name: String,
}

impl RepoReference {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    pub fn html_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Parse and validate a repository locator.
///
/// Accepts `https://github.com/owner/repo`, `github.com/owner/repo`,
/// `git@github.com:owner/repo.git` and the `owner/repo` shorthand.
pub fn validate(reference: &str) -> Result<RepoReference> {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Repository reference is empty".to_string()));
    }

    let path = if let Some(rest) = trimmed.strip_prefix("git@") {
        rest.strip_prefix("github.com:").ok_or_else(|| {
            AppError::Validation(format!("Unsupported SSH host in '{trimmed}'"))
        })?
    } else if let Some((scheme, rest)) = trimmed.split_once("://") {
        if !matches!(scheme.to_ascii_lowercase().as_str(), "https" | "http") {
            return Err(AppError::Validation(format!(
                "Unsupported scheme '{scheme}' in '{trimmed}'"
            )));
        }
        strip_host(rest)
            .ok_or_else(|| AppError::Validation(format!("Not a GitHub URL: '{trimmed}'")))?
    } else if let Some(rest) = strip_host(trimmed) {
        rest
    } else if trimmed.contains(':') {
        return Err(AppError::Validation(format!("Malformed reference '{trimmed}'")));
    } else {
        trimmed
    };

    let path = path.trim_end_matches('/');
    let mut segments = path.split('/');
    let owner = segments.next().unwrap_or_default();
    let name = segments.next().unwrap_or_default();
    if segments.next().is_some() {
        return Err(AppError::Validation(format!(
            "Expected exactly owner/name in '{trimmed}'"
        )));
    }

    let name = name.strip_suffix(".git").unwrap_or(name);

    if owner.is_empty() || name.is_empty() {
        return Err(AppError::Validation(format!(
            "Missing owner or repository name in '{trimmed}'"
        )));
    }
    if !OWNER.is_match(owner) {
        return Err(AppError::Validation(format!("Invalid owner '{owner}'")));
    }
    if !NAME.is_match(name) || name == "." || name == ".." {
        return Err(AppError::Validation(format!("Invalid repository name '{name}'")));
    }

    Ok(RepoReference {
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

fn strip_host(s: &str) -> Option<&str> {
    let lower = s.get(..11).map(str::to_ascii_lowercase);
    if lower.as_deref() == Some("github.com/") {
        return s.get(11..);
    }
    let lower = s.get(..15).map(str::to_ascii_lowercase);
    if lower.as_deref() == Some("www.github.com/") {
        return s.get(15..);
    }
    None
}

/// Normalize text before it enters the pipeline.
///
/// Line endings become `\n`, control characters other than `\n` and `\t`
/// are dropped, surrounding whitespace is trimmed and the result is cut to
/// `max_chars` characters (ending in `...` when cut). Absent input yields
/// the empty string, which downstream stages treat as "no content".
pub fn sanitize(content: Option<&str>, max_chars: usize) -> String {
    let Some(content) = content else {
        return String::new();
    };

    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let cleaned: String = normalized
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        return cleaned.to_string();
    }

    if max_chars < 3 {
        return cleaned.chars().take(max_chars).collect();
    }

    let keep = max_chars - 3;
    let mut truncated: String = cleaned.chars().take(keep).collect();
    truncated.truncate(truncated.trim_end().len());
    truncated.push_str("...");
    truncated
}
