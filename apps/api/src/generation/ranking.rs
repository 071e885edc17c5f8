//! Turns raw provider text for the ranking task into exactly one
//! `RankingResult` per input candidate.
//!
//! Parsing never fails. The provider is asked for a JSON array; when it answers with
//! something else the text is split on `CANDIDATE n` markers and each block is mined
//! for `Score:` / `Rationale:` / `Strength:` / `Concern:` labels. Anything still missing
//! is filled with placeholders, and the outcome says which path produced it.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::llm_client::strip_json_fences;

pub const DEFAULT_SCORE: u8 = 50;
pub const DEFAULT_RATIONALE: &str = "No rationale provided";
pub const DEFAULT_STRENGTH: &str = "N/A";
pub const DEFAULT_CONCERN: &str = "None identified";

/// Section marker anywhere in the text: `CANDIDATE 1`, `## Candidate #2:`,
/// `**Candidate 3**`, `1. CANDIDATE 0`, or several markers on one line.
static CANDIDATE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcandidate[ \t]*#?[ \t]*\d+[ \t]*[*_:).\]-]*").unwrap()
});

static FIELD_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(score|rationale|strengths?|concerns?)\b[ \t]*[*_]*[ \t]*:").unwrap()
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{1,3}(?:\.\d+)?").unwrap());

static OUT_OF_HUNDRED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)[ \t]*/[ \t]*100").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankingResult {
    /// Position of the candidate in the caller's input list.
    pub candidate_index: usize,
    pub score: u8,
    pub rationale: String,
    pub strength: String,
    pub concern: String,
}

impl RankingResult {
    fn placeholder(candidate_index: usize) -> Self {
        Self {
            candidate_index,
            score: DEFAULT_SCORE,
            rationale: DEFAULT_RATIONALE.to_string(),
            strength: DEFAULT_STRENGTH.to_string(),
            concern: DEFAULT_CONCERN.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    Structured,
    Heuristic,
}

/// Parse outcome. Both variants hold one result per candidate in presentation order.
#[derive(Debug, Clone, PartialEq)]
pub enum RankingOutcome {
    /// The provider returned a clean array with one entry per candidate.
    Structured(Vec<RankingResult>),
    /// Some or all results were recovered from free text or synthesized.
    Heuristic {
        results: Vec<RankingResult>,
        warnings: Vec<String>,
    },
}

impl RankingOutcome {
    #[cfg(test)]
    pub fn results(&self) -> &[RankingResult] {
        match self {
            RankingOutcome::Structured(results) => results,
            RankingOutcome::Heuristic { results, .. } => results,
        }
    }

    #[cfg(test)]
    pub fn warnings(&self) -> &[String] {
        match self {
            RankingOutcome::Structured(_) => &[],
            RankingOutcome::Heuristic { warnings, .. } => warnings,
        }
    }

    #[cfg(test)]
    pub fn mode(&self) -> ParseMode {
        match self {
            RankingOutcome::Structured(_) => ParseMode::Structured,
            RankingOutcome::Heuristic { .. } => ParseMode::Heuristic,
        }
    }

    /// Looks a result up by the candidate's input position, independent of sort order.
    #[cfg(test)]
    pub fn for_candidate(&self, candidate_index: usize) -> Option<&RankingResult> {
        self.results()
            .iter()
            .find(|r| r.candidate_index == candidate_index)
    }

    pub fn into_parts(self) -> (ParseMode, Vec<RankingResult>, Vec<String>) {
        match self {
            RankingOutcome::Structured(results) => (ParseMode::Structured, results, Vec::new()),
            RankingOutcome::Heuristic { results, warnings } => {
                (ParseMode::Heuristic, results, warnings)
            }
        }
    }
}

/// Parses `raw` into exactly `candidate_count` results sorted for presentation.
pub fn parse_ranking(raw: &str, candidate_count: usize) -> RankingOutcome {
    let mut warnings = Vec::new();

    let mut results = match structured_entries(raw) {
        Some(entries) => {
            if entries.len() != candidate_count {
                warnings.push(format!(
                    "Expected {candidate_count} ranking entries, received {}",
                    entries.len()
                ));
            }
            assign_structured(&entries, candidate_count, &mut warnings)
        }
        None => {
            warnings.push("Ranking response was not valid JSON; parsed as plain text".to_string());
            parse_blocks(raw, candidate_count, &mut warnings)
        }
    };

    sort_for_presentation(&mut results);

    if warnings.is_empty() {
        RankingOutcome::Structured(results)
    } else {
        warn!(
            "Ranking parsed heuristically with {} warning(s): {}",
            warnings.len(),
            warnings.join("; ")
        );
        RankingOutcome::Heuristic { results, warnings }
    }
}

/// Descending score, ties broken by ascending candidate index.
pub fn sort_for_presentation(results: &mut [RankingResult]) {
    results.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.candidate_index.cmp(&b.candidate_index))
    });
}

// ────────────────────────────────────────────────────────────────────────────
// Structured path
// ────────────────────────────────────────────────────────────────────────────

/// Finds a JSON array of objects in `raw`: the whole text, the outermost `[...]`
/// slice, or an array under a `rankings`/`results`/`candidates` key.
fn structured_entries(raw: &str) -> Option<Vec<Map<String, Value>>> {
    let text = strip_json_fences(raw).trim();
    let sliced = match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
        _ => None,
    };

    let items = std::iter::once(text)
        .chain(sliced)
        .filter_map(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .find_map(|value| match value {
            Value::Array(items) => Some(items),
            Value::Object(mut map) => ["rankings", "results", "candidates"]
                .iter()
                .find_map(|key| match map.remove(*key) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                }),
            _ => None,
        })?;

    if items.is_empty() {
        return None;
    }

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

fn assign_structured(
    entries: &[Map<String, Value>],
    candidate_count: usize,
    warnings: &mut Vec<String>,
) -> Vec<RankingResult> {
    let mut slots: Vec<Option<RankingResult>> = vec![None; candidate_count];
    let mut unplaced = Vec::new();

    // Entries with a usable declared index claim their slot first
    for (position, entry) in entries.iter().enumerate() {
        match declared_index(entry) {
            Some(index) if index < candidate_count && slots[index].is_none() => {
                slots[index] = Some(result_from_entry(entry, index));
            }
            Some(index) => {
                warnings.push(format!(
                    "Entry {position} declared unusable candidate index {index}"
                ));
                unplaced.push(position);
            }
            None => unplaced.push(position),
        }
    }

    // The rest fall back to their array position, then to the first free slot
    for position in unplaced {
        let target = if position < candidate_count && slots[position].is_none() {
            Some(position)
        } else {
            slots.iter().position(Option::is_none)
        };
        match target {
            Some(index) => slots[index] = Some(result_from_entry(&entries[position], index)),
            None => warnings.push(format!("Dropped surplus ranking entry {position}")),
        }
    }

    fill_missing(slots, warnings)
}

fn declared_index(entry: &Map<String, Value>) -> Option<usize> {
    let value = ["candidateIndex", "candidate_index", "index"]
        .iter()
        .find_map(|key| entry.get(*key))?;
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn result_from_entry(entry: &Map<String, Value>, candidate_index: usize) -> RankingResult {
    let score = match entry.get("score") {
        Some(Value::Number(n)) => n.as_f64().map(clamp_score),
        Some(Value::String(s)) => first_number(s),
        _ => None,
    };

    RankingResult {
        candidate_index,
        score: score.unwrap_or(DEFAULT_SCORE),
        rationale: text_field(entry, &["rationale", "reasoning"], DEFAULT_RATIONALE),
        strength: text_field(entry, &["strength", "strengths"], DEFAULT_STRENGTH),
        concern: text_field(entry, &["concern", "concerns"], DEFAULT_CONCERN),
    }
}

fn text_field(entry: &Map<String, Value>, keys: &[&str], default: &str) -> String {
    keys.iter()
        .find_map(|key| match entry.get(*key) {
            Some(Value::String(s)) => Some(clean_text(s)),
            Some(Value::Array(items)) => Some(clean_text(
                &items
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("; "),
            )),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Plain-text path
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Score,
    Rationale,
    Strength,
    Concern,
}

impl Field {
    fn from_label(label: &str) -> Self {
        let label = label.to_ascii_lowercase();
        if label.starts_with("score") {
            Field::Score
        } else if label.starts_with("rationale") {
            Field::Rationale
        } else if label.starts_with("strength") {
            Field::Strength
        } else {
            Field::Concern
        }
    }
}

fn parse_blocks(raw: &str, candidate_count: usize, warnings: &mut Vec<String>) -> Vec<RankingResult> {
    let markers: Vec<_> = CANDIDATE_MARKER.find_iter(raw).collect();
    if markers.is_empty() {
        warnings.push("No CANDIDATE sections found in ranking response".to_string());
    }

    let mut slots: Vec<Option<RankingResult>> = vec![None; candidate_count];
    for (position, marker) in markers.iter().enumerate() {
        if position >= candidate_count {
            warnings.push(format!(
                "Dropped {} surplus CANDIDATE section(s)",
                markers.len() - candidate_count
            ));
            break;
        }
        let end = markers
            .get(position + 1)
            .map_or(raw.len(), |next| block_end(raw, next.start()));
        slots[position] = Some(parse_block(&raw[marker.end()..end], position, warnings));
    }

    fill_missing(slots, warnings)
}

/// Where a block stops before the marker at `next`. List numbering or markdown
/// decoration leading up to the marker on its own line belongs to the next block.
fn block_end(raw: &str, next: usize) -> usize {
    let line_start = raw[..next].rfind('\n').map_or(0, |i| i + 1);
    let lead = &raw[line_start..next];
    if lead
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || ".)>#*_-".contains(c))
    {
        line_start
    } else {
        next
    }
}

fn parse_block(block: &str, candidate_index: usize, warnings: &mut Vec<String>) -> RankingResult {
    let labels: Vec<(Field, usize, usize)> = FIELD_LABEL
        .captures_iter(block)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let label = caps.get(1)?;
            Some((Field::from_label(label.as_str()), whole.start(), whole.end()))
        })
        .collect();

    // A field's value runs from its first label to the next label of any kind
    let segment = |field: Field| -> Option<&str> {
        let i = labels.iter().position(|(f, _, _)| *f == field)?;
        let end = labels.get(i + 1).map_or(block.len(), |(_, start, _)| *start);
        Some(&block[labels[i].2..end])
    };

    let score = segment(Field::Score)
        .and_then(first_number)
        .or_else(|| {
            OUT_OF_HUNDRED
                .captures(block)
                .and_then(|caps| caps.get(1))
                .and_then(|m| first_number(m.as_str()))
        });
    if score.is_none() {
        warnings.push(format!(
            "No score found for candidate {candidate_index}; defaulted to {DEFAULT_SCORE}"
        ));
    }

    let text = |field: Field, default: &str| {
        segment(field)
            .map(clean_text)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| default.to_string())
    };

    RankingResult {
        candidate_index,
        score: score.unwrap_or(DEFAULT_SCORE),
        rationale: text(Field::Rationale, DEFAULT_RATIONALE),
        strength: text(Field::Strength, DEFAULT_STRENGTH),
        concern: text(Field::Concern, DEFAULT_CONCERN),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ────────────────────────────────────────────────────────────────────────────

fn fill_missing(slots: Vec<Option<RankingResult>>, warnings: &mut Vec<String>) -> Vec<RankingResult> {
    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                warnings.push(format!("No ranking returned for candidate {index}; using placeholder"));
                RankingResult::placeholder(index)
            })
        })
        .collect()
}

fn first_number(text: &str) -> Option<u8> {
    NUMBER
        .find(text)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(clamp_score)
}

fn clamp_score(score: f64) -> u8 {
    score.round().clamp(0.0, 100.0) as u8
}

/// Collapses whitespace and trims markdown emphasis left around a labeled value.
fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace())
        .to_string()
}
