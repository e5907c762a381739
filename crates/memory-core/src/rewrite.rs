//! Query rewriting for the full-text index.
//!
//! FTS5's default conjunction rejects any candidate missing one term, so a
//! four-word query over short memories usually matches nothing. The
//! rewriter joins prefix-wildcarded terms with OR to maximize recall; the
//! scoring engine's coverage signal restores precision by ranking
//! full-term matches above partial ones.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use memory_types::{MemoryError, Result, SearchSettings};

/// A rewritten query: the FTS match expression plus the extracted terms
/// used downstream for coverage scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewrittenQuery {
    /// Boolean/phrase expression in FTS5 syntax, e.g.
    /// `"exact phrase" OR bonsai* OR tree*`
    pub match_expr: String,

    /// Deduplicated, lowercased terms in first-seen order. Quoted phrases
    /// appear as single terms without their quotes.
    pub terms: Vec<String>,
}

/// Rewrites raw query strings into FTS5 match expressions.
pub struct QueryRewriter {
    min_term_length: usize,
    stopwords: HashSet<String>,
}

impl QueryRewriter {
    /// Build a rewriter from search settings.
    pub fn new(settings: &SearchSettings) -> Self {
        Self {
            min_term_length: settings.min_term_length,
            stopwords: settings.stopwords.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// Rewrite a raw query.
    ///
    /// Quoted substrings pass through as exact-phrase tokens; everything
    /// else splits into terms that are length-filtered, stopword-filtered,
    /// stripped of FTS-reserved characters, and suffixed with `*` so
    /// `home` also matches `homelab`. Zero surviving tokens is a
    /// validation error, never a silent match-all.
    pub fn rewrite(&self, raw: &str) -> Result<RewrittenQuery> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MemoryError::Validation("query must not be empty".to_string()));
        }

        let (phrases, remainder) = split_phrases(raw);

        let mut tokens: Vec<String> = Vec::new();
        let mut terms: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for phrase in &phrases {
            let term = phrase.to_lowercase();
            if seen.insert(term.clone()) {
                tokens.push(format!("\"{phrase}\""));
                terms.push(term);
            }
        }

        for word in remainder.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }
            let term = word.to_lowercase();
            if term.chars().count() < self.min_term_length || self.stopwords.contains(&term) {
                continue;
            }
            if seen.insert(term.clone()) {
                tokens.push(format!("{term}*"));
                terms.push(term);
            }
        }

        if tokens.is_empty() {
            return Err(MemoryError::Validation(format!(
                "query '{raw}' contains no searchable terms"
            )));
        }

        Ok(RewrittenQuery {
            match_expr: tokens.join(" OR "),
            terms,
        })
    }
}

/// Extract double-quoted spans. Returns the phrase contents (quotes and
/// reserved characters removed, never word-split) and the remaining text.
fn split_phrases(raw: &str) -> (Vec<String>, String) {
    let mut phrases = Vec::new();
    let mut remainder = String::with_capacity(raw.len());
    let mut in_phrase = false;
    let mut current = String::new();

    for c in raw.chars() {
        match (c, in_phrase) {
            ('"', false) => in_phrase = true,
            ('"', true) => {
                let phrase = sanitize_phrase(&current);
                if !phrase.is_empty() {
                    phrases.push(phrase);
                }
                current.clear();
                in_phrase = false;
            }
            (_, true) => current.push(c),
            (_, false) => remainder.push(c),
        }
    }
    // Unterminated quote: treat the tail as plain text
    if in_phrase {
        remainder.push(' ');
        remainder.push_str(&current);
    }

    (phrases, remainder)
}

/// Keep phrase text verbatim apart from characters FTS5 reserves inside
/// strings.
fn sanitize_phrase(phrase: &str) -> String {
    phrase
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '\'')
        .collect::<String>()
        .trim()
        .to_string()
}
