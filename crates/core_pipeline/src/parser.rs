//! Draw-line parser
//!
//! Picks candidate ticket draws out of recognized text with two rules:
//! a bracketed bonus group, or a run of short numbers. Both are heuristics
//! with known false positives (e.g. dates, prices) and false negatives
//! (numbers glued together by OCR).

use crate::types::{DrawKind, ParsedDraw};
use regex::Regex;
use std::sync::OnceLock;

/// Minimum repetitions of a 1-2 digit number followed by whitespace
///
/// On a trimmed line the last group must be followed by another token, so
/// in practice this means five numbers.
pub const MIN_NUMBER_GROUPS: usize = 4;

fn number_run() -> &'static Regex {
    static NUMBER_RUN: OnceLock<Regex> = OnceLock::new();
    NUMBER_RUN.get_or_init(|| {
        Regex::new(&format!(r"(?:\d{{1,2}}\s+){{{},}}", MIN_NUMBER_GROUPS))
            .expect("number run pattern is valid")
    })
}

/// Classify a single line, ignoring blank ones
pub fn classify_line(line: &str) -> Option<DrawKind> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.contains('[') && trimmed.contains(']') {
        Some(DrawKind::BonusGroup)
    } else if number_run().is_match(trimmed) {
        Some(DrawKind::NumberRun)
    } else {
        None
    }
}

/// Lazy iterator over the draws in a block of text
///
/// Cloning restarts from the current position; [`parse_draws`] on the same
/// text always yields the same sequence.
#[derive(Debug, Clone)]
pub struct Draws<'a> {
    lines: std::str::Lines<'a>,
}

impl Iterator for Draws<'_> {
    type Item = ParsedDraw;

    fn next(&mut self) -> Option<ParsedDraw> {
        for line in self.lines.by_ref() {
            if let Some(kind) = classify_line(line) {
                return Some(ParsedDraw {
                    line: line.to_string(),
                    kind,
                    display: format!("{} {}", kind.marker(), line.trim()),
                });
            }
        }
        None
    }
}

/// Scan recognized text for draws, in input order
pub fn parse_draws(text: &str) -> Draws<'_> {
    Draws {
        lines: text.lines(),
    }
}
