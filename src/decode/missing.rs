// src/decode/missing.rs

use std::collections::BTreeSet;

/// Sentinel conventions of the layout: which raw values mean "not collected".
///
/// Tokens are compared, case-sensitively, against the *trimmed* field text.
/// A whitespace-only token can never match trimmed text, so configuring one
/// (the layout's literal `' '` convention) switches on `blank_is_missing`
/// instead: blank fields then decode as missing rather than as empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingTokens {
    tokens: BTreeSet<String>,
    blank_is_missing: bool,
}

pub const DEFAULT_TOKENS: [&str; 3] = ["L", "M", "."];

impl Default for MissingTokens {
    fn default() -> Self {
        MissingTokens::new(DEFAULT_TOKENS)
    }
}

impl MissingTokens {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        let mut blank_is_missing = false;
        for tok in tokens {
            let t = tok.as_ref().trim();
            if t.is_empty() {
                blank_is_missing = true;
            } else {
                set.insert(t.to_string());
            }
        }
        MissingTokens {
            tokens: set,
            blank_is_missing,
        }
    }

    /// No tokens, blanks kept as empty text.
    pub fn none() -> Self {
        MissingTokens {
            tokens: BTreeSet::new(),
            blank_is_missing: false,
        }
    }

    pub fn with_blank_is_missing(mut self, on: bool) -> Self {
        self.blank_is_missing = on;
        self
    }

    pub fn blank_is_missing(&self) -> bool {
        self.blank_is_missing
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// `trimmed` must already be stripped of surrounding whitespace.
    pub fn is_missing(&self, trimmed: &str) -> bool {
        if trimmed.is_empty() {
            return self.blank_is_missing;
        }
        self.tokens.contains(trimmed)
    }
}
