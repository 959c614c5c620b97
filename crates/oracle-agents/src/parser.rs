use oracle_models::{Confidence, Direction};

use crate::error::AgentError;

const PREDICTION: &str = "PREDICTION:";
const CONFIDENCE: &str = "CONFIDENCE:";
const REASONING: &str = "REASONING:";

/// What an analyst reply says once the three labelled lines are extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub direction: Direction,
    pub confidence: Confidence,
    pub reasoning: String,
}

/// Strip list markers, headings and emphasis that models like to wrap
/// labelled lines in: `- **PREDICTION:** UP`, `## CONFIDENCE: HIGH`.
fn strip_decoration(line: &str) -> &str {
    line.trim()
        .trim_start_matches(['-', '#', '>', ' ', '\t'])
        .trim_matches(['*', '_', '`'])
        .trim()
}

/// The value after `label` if `line` starts with it (case-insensitive).
fn labelled_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }
    Some(line[label.len()..].trim_matches(['*', '_', '`', ' ', '\t']))
}

/// A token value upper-cased, without brackets or trailing punctuation:
/// `[up]` and `Up.` both become `UP`. Multi-word values are kept whole so
/// they fail to parse, and an echoed template like `[UP or DOWN]` is never
/// read as its first option.
fn normalize_token(value: &str) -> String {
    value
        .trim_matches(['[', ']', '(', ')', '"', '\''])
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_ascii_alphanumeric()))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase()
}

/// Parse an analyst reply by line prefix. The first occurrence of each label
/// wins. A missing or unrecognized `PREDICTION` or `CONFIDENCE` is an error;
/// a missing `REASONING` becomes an empty string.
pub fn parse_prediction_reply(text: &str) -> Result<ParsedReply, AgentError> {
    let mut direction = None;
    let mut confidence = None;
    let mut reasoning = None;

    for raw in text.lines() {
        // Emphasis may close after the label (`**PREDICTION:** UP`)
        let line = strip_decoration(raw).replacen("**", "", 2);
        let line = line.as_str();

        if direction.is_none() {
            if let Some(value) = labelled_value(line, PREDICTION) {
                direction = Some(normalize_token(value));
                continue;
            }
        }
        if confidence.is_none() {
            if let Some(value) = labelled_value(line, CONFIDENCE) {
                confidence = Some(normalize_token(value));
                continue;
            }
        }
        if reasoning.is_none() {
            if let Some(value) = labelled_value(line, REASONING) {
                reasoning = Some(value.trim_matches(['[', ']']).trim().to_string());
            }
        }
    }

    let direction = direction
        .ok_or_else(|| AgentError::Parse("reply has no PREDICTION line".to_string()))?
        .parse::<Direction>()
        .map_err(|e| AgentError::Parse(e.to_string()))?;
    let confidence = confidence
        .ok_or_else(|| AgentError::Parse("reply has no CONFIDENCE line".to_string()))?
        .parse::<Confidence>()
        .map_err(|e| AgentError::Parse(e.to_string()))?;

    Ok(ParsedReply {
        direction,
        confidence,
        reasoning: reasoning.unwrap_or_default(),
    })
}

/// `1. text` or `2) text` becomes `text`; anything else is left alone.
fn strip_numbering(line: &str) -> &str {
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    match line[digits..].strip_prefix(['.', ')']) {
        Some(rest) if digits > 0 && rest.starts_with(' ') => rest.trim_start(),
        _ => line,
    }
}

/// Headlines the editor kept, in feed order. Only lines naming one of the
/// fetched headlines count, so the reply cannot add news of its own.
pub fn parse_headline_selection(text: &str, candidates: &[String]) -> Vec<String> {
    let kept: Vec<&str> = text
        .lines()
        .map(|line| strip_numbering(strip_decoration(line)).trim_matches(['"', ' ']))
        .filter(|line| !line.is_empty())
        .collect();

    candidates
        .iter()
        .filter(|candidate| {
            kept.iter()
                .any(|line| line.eq_ignore_ascii_case(candidate.trim()))
        })
        .cloned()
        .collect()
}
