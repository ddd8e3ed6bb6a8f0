use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::candidate::{AddressNode, AddressTree, Candidate, StreetValue};
use crate::errors::{AppError, AppResult};

// Building-number run at the head of the text after a matched street,
// eg. "591-593號QWER" captures 591 and 593.
static RE_BUILDING_NO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9A-z]+)[至及\-]*([0-9A-z]*)號").expect("invalid RE_BUILDING_NO"));

/// Character span inside the query, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// How one suggested field fared against the query. `span` is `None` when
/// the field found no footing in the query at all.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub field: String,
    pub value: String,
    pub span: Option<Span>,
    pub goodness: Option<f64>,
}

/// Result of scoring one candidate tree against a query address.
#[derive(Debug, Clone)]
pub struct Similarity {
    pub score: f64,
    pub query: String,
    pub coverage: Vec<bool>,
    pub matches: Vec<FieldMatch>,
}

impl Similarity {
    pub fn compute(query: &str, tree: &AddressTree) -> Similarity {
        let query_chars: Vec<char> = query.chars().collect();
        let matches = match_tree(&query_chars, tree);

        let mut coverage = vec![false; query_chars.len()];
        let mut score = 0.0;
        for m in &matches {
            let Some(span) = m.span else {
                score -= 1.0;
                continue;
            };
            score += field_weight(&m.field) * m.goodness.unwrap_or(0.0);
            for covered in &mut coverage[span.start..span.end] {
                *covered = true;
            }
        }

        Similarity {
            score,
            query: query.to_string(),
            coverage,
            matches,
        }
    }
}

impl fmt::Display for Similarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "query: {}", self.query)?;
        let mask: String = self
            .query
            .chars()
            .zip(&self.coverage)
            .map(|(c, covered)| if *covered { c } else { '?' })
            .collect();
        writeln!(f, "match: {mask}")?;
        for m in &self.matches {
            match (m.span, m.goodness) {
                (Some(span), Some(goodness)) => writeln!(
                    f,
                    "  {}={} [{}, {}) goodness {goodness:.2}",
                    m.field, m.value, span.start, span.end
                )?,
                _ => writeln!(f, "  {}={} unmatched", m.field, m.value)?,
            }
        }
        write!(f, "score: {}", self.score)
    }
}

/// Scores every candidate against the query and returns the best one with
/// its similarity. Equal scores fall back to provider rank, lower first.
pub fn select_best(candidates: Vec<Candidate>, query: &str) -> AppResult<(Candidate, Similarity)> {
    let mut scored: Vec<(Candidate, Similarity)> = candidates
        .into_iter()
        .map(|candidate| {
            let similarity = Similarity::compute(query, &candidate.chi);
            (candidate, similarity)
        })
        .collect();
    // stable sort, so provider rank breaks ties
    scored.sort_by(|a, b| b.1.score.total_cmp(&a.1.score));
    scored.into_iter().next().ok_or(AppError::EmptyCandidates)
}

fn match_tree(query: &[char], tree: &AddressTree) -> Vec<FieldMatch> {
    let mut matches = Vec::new();
    for field in &tree.fields {
        match &field.node {
            AddressNode::Street(street) => {
                matches.extend(match_street_or_village(query, street));
            }
            AddressNode::Object(inner) => matches.extend(match_tree(query, inner)),
            AddressNode::Text(text) => matches.push(match_str(query, &field.name, text)),
        }
    }
    matches
}

/// Looks for `value` inside the query, progressively stripping the head of
/// `value` so a query naming 兆康站 still matches a suggested 港鐵兆康站.
/// Goodness scales with how much of the value survived the strip.
fn match_str(query: &[char], field: &str, value: &str) -> FieldMatch {
    let value_chars: Vec<char> = value.chars().collect();
    let mut span = None;
    let mut goodness = None;

    for i in 0..value_chars.len() {
        let needle = &value_chars[i..];
        if let Some(start) = find_chars(query, needle) {
            span = Some(Span {
                start,
                end: start + needle.len(),
            });
            goodness = Some((needle.len() as f64 / value_chars.len() as f64 - 0.5) * 2.0);
            break;
        }
        if value_chars.len() - i <= 3 {
            break; // remainder too short to trust
        }
        if i >= value_chars.len() / 2 {
            break; // half the value stripped already
        }
    }

    FieldMatch {
        field: field.to_string(),
        value: value.to_string(),
        span,
        goodness,
    }
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn match_street_or_village(query: &[char], street: &StreetValue) -> Vec<FieldMatch> {
    let mut matches = Vec::new();

    // Only the last whitespace token counts, so "屯門 青麟路" matches on
    // the street proper.
    let token = street.name.split_whitespace().last().unwrap_or_default();
    let street_match = match_str(query, street.kind.field_name(), token);
    let street_span = street_match.span;
    matches.push(street_match);

    let from = match street.building_no_from.as_deref() {
        Some(from) if !from.is_empty() => from,
        _ => return matches,
    };

    // Building numbers sit right after the matched street in the query.
    let mut query_span = None;
    let mut query_from = String::new();
    let mut query_to = String::new();
    if let Some(span) = street_span {
        let rest: String = query[span.end..].iter().collect();
        if let Some(caps) = RE_BUILDING_NO.captures(&rest) {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            query_span = Some(Span {
                start: span.end,
                end: span.end + whole.chars().count(),
            });
            query_from = caps.get(1).map_or("", |m| m.as_str()).to_string();
            query_to = caps.get(2).map_or("", |m| m.as_str()).to_string();
        }
    }

    // Single numbers read as one-element ranges.
    let to_on_record = street.building_no_to.clone().unwrap_or_default();
    let suggested_to = if to_on_record.is_empty() {
        from.to_string()
    } else {
        to_on_record
    };
    let probed_to = if query_to.is_empty() {
        query_from.clone()
    } else {
        query_to
    };

    // Ranges compare as text, the same way the lookup service formats
    // them. Disjoint ranges void the span.
    if suggested_to.as_str() < query_from.as_str() || from > probed_to.as_str() {
        query_span = None;
    }

    let goodness = if query_from == from { 1.0 } else { 0.5 };
    matches.push(FieldMatch {
        field: "BuildingNoFrom".to_string(),
        value: from.to_string(),
        span: query_span,
        goodness: Some(goodness),
    });

    if street.building_no_to.is_some() {
        let goodness = if probed_to == suggested_to { 1.0 } else { 0.5 };
        matches.push(FieldMatch {
            field: "BuildingNoTo".to_string(),
            value: suggested_to,
            span: query_span,
            goodness: Some(goodness),
        });
    }

    matches
}

fn field_weight(field: &str) -> f64 {
    match field {
        "Region" => 10.0,
        "StreetName" | "VillageName" | "EstateName" => 20.0,
        "BuildingNoFrom" | "BuildingNoTo" => 30.0,
        "BuildingName" => 40.0,
        _ => 0.0,
    }
}
