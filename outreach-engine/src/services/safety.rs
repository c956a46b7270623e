//! Content safety filter
//!
//! Regex pattern matching over generated drafts. Scoring starts at 100 and
//! deducts per finding; content scoring at or above 70 is considered safe.
//! Filtering replaces pattern matches with "[removed]", appends any missing
//! compliance disclaimer, and empties content that still rescores below 50.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::Serialize;

/// Minimum score for content to be considered safe
pub const SAFE_SCORE: i32 = 70;
/// Content rescoring below this after filtering is discarded entirely
const DISCARD_SCORE: i32 = 50;

const PATTERN_PENALTY: i32 = 50;
const TOPIC_PENALTY: i32 = 30;
const TONE_PENALTY: i32 = 20;
const DISCLAIMER_PENALTY: i32 = 10;

/// Violation category for a matched pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationCategory {
    Abusive,
    Inappropriate,
    Hateful,
    Illegal,
    FinancialFraud,
    GdprViolation,
    ProhibitedTopic,
    ToneViolation,
    MissingDisclaimer,
}

/// One finding from a safety scan
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub category: ViolationCategory,
    pub matched: String,
}

/// Outcome of scanning (and optionally filtering) a piece of content
#[derive(Debug, Clone, Serialize)]
pub struct SafetyReport {
    pub score: i32,
    pub safe: bool,
    pub violations: Vec<Violation>,
}

fn pattern(source: &str) -> Regex {
    // Patterns are static literals; a bad one is a programming error
    RegexBuilder::new(source)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|e| panic!("invalid safety pattern {:?}: {}", source, e))
}

fn case_sensitive_pattern(source: &str) -> Regex {
    Regex::new(source)
        .unwrap_or_else(|e| panic!("invalid safety pattern {:?}: {}", source, e))
}

static CATEGORY_PATTERNS: Lazy<Vec<(ViolationCategory, Regex)>> = Lazy::new(|| {
    vec![
        (
            ViolationCategory::Abusive,
            pattern(r"\b(stupid|idiot|moron|pathetic|worthless|loser)\b"),
        ),
        (
            ViolationCategory::Inappropriate,
            pattern(r"\b(sexy|hot singles|adult content|explicit)\b"),
        ),
        (
            ViolationCategory::Hateful,
            pattern(r"\b(hate|despise)\s+(you|your|them|those)\b"),
        ),
        (
            ViolationCategory::Illegal,
            pattern(r"\b(launder|smuggl\w+|counterfeit|stolen\s+(data|goods))\b"),
        ),
        (
            ViolationCategory::FinancialFraud,
            pattern(
                r"\b(guaranteed\s+returns?|double\s+your\s+money|risk.?free\s+investment|wire\s+transfer\s+now)\b",
            ),
        ),
        (
            ViolationCategory::GdprViolation,
            pattern(
                r"\b(we\s+(bought|scraped)\s+your\s+(data|email|info)|sold\s+your\s+information)\b",
            ),
        ),
    ]
});

static PROHIBITED_TOPICS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(r"\b(gambling|casino|betting)\b"),
        pattern(r"\b(crypto(currency)?\s+pump|pump\s+and\s+dump)\b"),
        pattern(r"\b(miracle\s+cure|lose\s+\d+\s+(pounds|kgs?)\b)"),
        pattern(r"\b(payday\s+loan|debt\s+relief\s+now)\b"),
    ]
});

static TONE_VIOLATIONS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        pattern(r"\b(act\s+now\s+or\s+(else|lose)|last\s+chance|final\s+warning)\b"),
        pattern(r"\b(you\s+must\s+(buy|sign|pay))\b"),
        pattern(r"!!!+"),
        // Shouting detector stays case-sensitive, unlike the rest
        case_sensitive_pattern(r"\b[A-Z]{5,}\b"),
    ]
});

/// Compliance disclaimer required per campaign type
pub fn required_disclaimer(campaign_type: &str) -> Option<&'static str> {
    match campaign_type {
        "financial" => Some(
            "Investments are subject to market risks. Past performance does not guarantee future results.",
        ),
        "healthcare" => Some(
            "This communication is for informational purposes only and is not medical advice.",
        ),
        "email" | "linkedin" => {
            Some("You can opt out of future communications at any time.")
        }
        _ => None,
    }
}

/// Scan content without modifying it
pub fn scan(content: &str, campaign_type: &str) -> SafetyReport {
    let mut violations = Vec::new();

    for (category, regex) in CATEGORY_PATTERNS.iter() {
        if let Some(m) = regex.find(content) {
            violations.push(Violation {
                category: *category,
                matched: m.as_str().to_string(),
            });
        }
    }
    for regex in PROHIBITED_TOPICS.iter() {
        if let Some(m) = regex.find(content) {
            violations.push(Violation {
                category: ViolationCategory::ProhibitedTopic,
                matched: m.as_str().to_string(),
            });
        }
    }
    for regex in TONE_VIOLATIONS.iter() {
        if let Some(m) = regex.find(content) {
            violations.push(Violation {
                category: ViolationCategory::ToneViolation,
                matched: m.as_str().to_string(),
            });
        }
    }
    if let Some(disclaimer) = required_disclaimer(campaign_type) {
        if !content.contains(disclaimer) {
            violations.push(Violation {
                category: ViolationCategory::MissingDisclaimer,
                matched: String::new(),
            });
        }
    }

    let score = score_from(&violations);
    SafetyReport {
        score,
        safe: score >= SAFE_SCORE,
        violations,
    }
}

fn score_from(violations: &[Violation]) -> i32 {
    let mut score = 100;
    for violation in violations {
        score -= match violation.category {
            ViolationCategory::ProhibitedTopic => TOPIC_PENALTY,
            ViolationCategory::ToneViolation => TONE_PENALTY,
            ViolationCategory::MissingDisclaimer => DISCLAIMER_PENALTY,
            _ => PATTERN_PENALTY,
        };
    }
    score.clamp(0, 100)
}

/// Filter content: replace pattern matches with "[removed]", append a
/// missing disclaimer, and drop the content entirely if it still scores
/// below 50. Returns the filtered text and the post-filter report.
pub fn filter(content: &str, campaign_type: &str) -> (String, SafetyReport) {
    let mut filtered = content.to_string();

    for (_, regex) in CATEGORY_PATTERNS.iter() {
        filtered = regex.replace_all(&filtered, "[removed]").into_owned();
    }
    for regex in PROHIBITED_TOPICS.iter() {
        filtered = regex.replace_all(&filtered, "[removed]").into_owned();
    }

    if let Some(disclaimer) = required_disclaimer(campaign_type) {
        if !filtered.contains(disclaimer) {
            filtered = format!("{}\n\n{}", filtered.trim_end(), disclaimer);
        }
    }

    let report = scan(&filtered, campaign_type);
    if report.score < DISCARD_SCORE {
        return (String::new(), report);
    }
    (filtered, report)
}

/// Validate a generated email template: a usable subject and a body with
/// real content.
pub fn validate_email_template(subject: &str, body: &str) -> Result<(), String> {
    if subject.trim().chars().count() < 5 {
        return Err("email subject must be at least 5 characters".to_string());
    }
    if body.trim().chars().count() < 20 {
        return Err("email body must be at least 20 characters".to_string());
    }
    Ok(())
}

static LEFTOVER_PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| pattern(r"\[[^\]]+\]"));

/// Validate a call script section: spoken text must not contain leftover
/// bracketed placeholders, which a voice would read aloud.
pub fn validate_call_script(script: &str) -> Result<(), String> {
    if let Some(m) = LEFTOVER_PLACEHOLDER.find(script) {
        return Err(format!(
            "call script contains unresolved placeholder {}",
            m.as_str()
        ));
    }
    Ok(())
}
