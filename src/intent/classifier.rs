//! Rule-table intent classifier
//!
//! An ordered list of `(patterns, intent)` rules, evaluated top to bottom.
//! The first rule with any matching pattern wins; a query matching nothing
//! is Descriptive. Matching is case-insensitive and anchored at word starts:
//! "futures" matches "future", while "will" in "goodwill" does not. Patterns
//! that must not run into a longer word ("will", "project") end in `\b`.

use super::Intent;
use regex::Regex;

/// Ordered rule table. Precedence is the row order.
const RULES: &[(Intent, &[&str])] = &[
    (
        Intent::Prescriptive,
        &[
            "should",
            "recommend\\w*",
            "optimi[sz]\\w*",
            "strateg\\w*",
            "suggest\\w*",
            "advise",
            "best way",
            "what if",
            "how (?:can|do) we (?:improve|increase|grow|boost|reduce)",
            "how to (?:improve|increase|grow|boost|reduce)",
        ],
    ),
    (
        Intent::Predictive,
        &[
            "will\\b",
            "forecast\\w*",
            "predict\\w*",
            "future",
            "next (?:year|quarter|month|week|period)",
            "projection\\w*",
            "project(?:ed)?\\b",
            "trend\\w*",
            "expect\\w*",
            "going to",
            "outlook",
        ],
    ),
    (
        Intent::Diagnostic,
        &[
            "why",
            "reason\\w*",
            "caus\\w*",
            "explain\\w*",
            "driv(?:er|ers|ing|en)",
            "drove",
            "factor\\w*",
            "what happened",
            "declin\\w*",
            "dropp?(?:ed)?",
            "underperform\\w*",
        ],
    ),
];

struct Rule {
    intent: Intent,
    pattern: Regex,
    keywords: &'static [&'static str],
}

/// Outcome of classification, with the matched keyword for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub matched: Option<String>,
}

pub struct IntentClassifier {
    rules: Vec<Rule>,
}

impl IntentClassifier {
    pub fn new() -> Self {
        let rules = RULES
            .iter()
            .filter_map(|(intent, keywords)| {
                let alternation = keywords.join("|");
                // The table is static; a pattern that failed to compile would
                // only ever drop its own rule.
                Regex::new(&format!(r"(?i)\b(?:{})", alternation))
                    .ok()
                    .map(|pattern| Rule {
                        intent: *intent,
                        pattern,
                        keywords,
                    })
            })
            .collect();
        Self { rules }
    }

    /// Intent for `query`. Keywords match as phrase prefixes at a word start,
    /// so inflected forms ("forecasting", "futures") count but a keyword
    /// buried inside another word ("unrecommended") does not.
    pub fn classify(&self, query: &str) -> Intent {
        self.explain(query).intent
    }

    /// Classify and report the phrase that decided it.
    pub fn explain(&self, query: &str) -> Classification {
        for rule in &self.rules {
            if let Some(m) = rule.pattern.find(query) {
                return Classification {
                    intent: rule.intent,
                    matched: Some(m.as_str().to_lowercase()),
                };
            }
        }
        Classification {
            intent: Intent::Descriptive,
            matched: None,
        }
    }

    /// Number of keyword patterns per intent, in precedence order.
    pub fn rule_summary(&self) -> Vec<(Intent, usize)> {
        self.rules.iter().map(|r| (r.intent, r.keywords.len())).collect()
    }
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}
