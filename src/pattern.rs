// src/pattern.rs

//! The `%` wildcard matcher used by rule targets and dependency templates.
//!
//! A pattern contains at most one `%`, which matches any substring of the
//! target (including an empty one, and across path separators). A doubled
//! `%%` is an escaped literal percent and does not count as a wildcard.
//! Patterns without a wildcard only match an exactly equal target.
//!
//! The matcher is pure; all filesystem and registry concerns live elsewhere.

use crate::errors::{Error, Result};

/// A parsed target or dependency pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    raw: String,
    parts: Parts,
}

#[derive(Debug, Clone)]
enum Parts {
    /// No wildcard; the unescaped literal text.
    Literal(String),
    /// One wildcard; unescaped text around the `%`.
    Wild { prefix: String, suffix: String },
}

impl Pattern {
    /// Parse a pattern, rejecting more than one unescaped `%`.
    pub fn parse(raw: &str) -> Result<Pattern> {
        let (pieces, wildcards) = split_on_wildcard(raw)?;
        let parts = match wildcards {
            0 => Parts::Literal(pieces.0),
            _ => Parts::Wild {
                prefix: pieces.0,
                suffix: pieces.1,
            },
        };
        Ok(Pattern {
            raw: raw.to_string(),
            parts,
        })
    }

    /// The pattern source text, escapes intact.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.parts, Parts::Wild { .. })
    }

    /// Literal equality match for wildcard-free patterns.
    ///
    /// Always false for wildcard patterns; use [`Pattern::bind`] for those.
    pub fn matches_exact(&self, target: &str) -> bool {
        match &self.parts {
            Parts::Literal(lit) => lit == target,
            Parts::Wild { .. } => false,
        }
    }

    /// Bind a wildcard pattern against a target, returning the stem the `%`
    /// matched. Returns `None` for wildcard-free patterns or on mismatch.
    pub fn bind<'t>(&self, target: &'t str) -> Option<&'t str> {
        match &self.parts {
            Parts::Literal(_) => None,
            Parts::Wild { prefix, suffix } => {
                if target.len() < prefix.len() + suffix.len() {
                    return None;
                }
                if !target.starts_with(prefix.as_str()) || !target.ends_with(suffix.as_str()) {
                    return None;
                }
                Some(&target[prefix.len()..target.len() - suffix.len()])
            }
        }
    }

    /// Length of the literal text before the `%`, used to rank competing
    /// pattern matches. Wildcard-free patterns rank by their full length.
    pub fn literal_prefix_len(&self) -> usize {
        match &self.parts {
            Parts::Literal(lit) => lit.len(),
            Parts::Wild { prefix, .. } => prefix.len(),
        }
    }
}

/// Replace the single `%` in `template` with `stem`, unescaping `%%`.
///
/// Templates without a wildcard come back as their literal text. More than
/// one `%` is a configuration error.
pub fn substitute(template: &str, stem: &str) -> Result<String> {
    let ((prefix, suffix), wildcards) = split_on_wildcard(template)?;
    if wildcards == 0 {
        return Ok(prefix);
    }
    let mut out = String::with_capacity(prefix.len() + stem.len() + suffix.len());
    out.push_str(&prefix);
    out.push_str(stem);
    out.push_str(&suffix);
    Ok(out)
}

/// Split `raw` into the unescaped text before and after the wildcard.
/// The second element stays empty when there is no wildcard.
fn split_on_wildcard(raw: &str) -> Result<((String, String), usize)> {
    let mut prefix = String::new();
    let mut suffix = String::new();
    let mut wildcards = 0usize;

    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        let current = if wildcards == 0 { &mut prefix } else { &mut suffix };
        if c != '%' {
            current.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            current.push('%');
            continue;
        }
        wildcards += 1;
        if wildcards > 1 {
            return Err(Error::InvalidPattern {
                pattern: raw.to_string(),
                reason: "multiple '%' wildcards are not allowed".to_string(),
            });
        }
    }

    Ok(((prefix, suffix), wildcards))
}
