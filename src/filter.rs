// src/filter.rs
//! Cousin-domain suffix filtering.
//!
//! Watches for `<anything>.<base-domain>.<tld>` patterns, the shape used by
//! lookalike registrations; the base domain itself is deliberately not a
//! match.

use anyhow::Context;
use std::path::Path;

/// Filter that tests DNS names against the base-domain x suffix-token
/// cross product.
#[derive(Debug, Clone)]
pub struct SuffixFilter {
    patterns: Vec<String>,
}

impl SuffixFilter {
    /// Build the effective pattern set: `"." + base + "." + token` for every
    /// (base domain, suffix token) pair.
    pub fn new(base_domains: &[String], tokens: &[String]) -> Self {
        let mut patterns = Vec::with_capacity(base_domains.len() * tokens.len());

        for base in base_domains {
            let base = base.trim().trim_matches('.');
            if base.is_empty() {
                continue;
            }
            for token in tokens {
                let token = token.trim().trim_matches('.');
                if token.is_empty() {
                    continue;
                }
                patterns.push(format!(".{base}.{token}"));
            }
        }

        patterns.sort();
        patterns.dedup();

        Self { patterns }
    }

    /// Load suffix tokens from a file, one per line. Blank lines and `#`
    /// comments are skipped, surrounding whitespace trimmed. Tokens are kept
    /// verbatim otherwise; matching is case-sensitive.
    pub fn load_tokens(path: &Path) -> anyhow::Result<Vec<String>> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read suffix token file {}", path.display()))?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect())
    }

    /// True if the name ends with any configured pattern, byte-exact.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| name.ends_with(p.as_str()))
    }

    /// Number of effective patterns.
    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }
}
