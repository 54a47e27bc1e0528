//! Free-text request parsing.
//!
//! Pulls the destination, an explicit origin ("from X to Y") and the travel
//! mode out of a request such as `"public transport to Times Square"`. The
//! parser is deliberately shallow: it looks for a handful of phrasings and
//! never fails, leaving `destination` empty when it finds nothing usable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Phrasings that introduce a destination directly.
const DESTINATION_PREFIXES: &[&str] = &[
    "how do i get to ",
    "how to get to ",
    "directions to ",
    "navigate to ",
    "take me to ",
    "get me to ",
    "route to ",
    "to ",
];

/// Leading words that name a mode rather than a place.
const MODE_WORDS: &[&str] = &[
    "public transport",
    "public transit",
    "transit",
    "subway",
    "metro",
    "train",
    "bus",
    "tram",
    "walk",
    "drive",
    "bike",
    "directions",
];

/// How the traveller wants to get there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TravelMode {
    /// Bus, subway, train. The default.
    #[default]
    Transit,
    /// By car.
    Driving,
    /// On foot.
    Walking,
    /// By bicycle.
    Bicycling,
}

impl TravelMode {
    /// Provider-facing identifier for the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Transit => "transit",
            TravelMode::Driving => "driving",
            TravelMode::Walking => "walking",
            TravelMode::Bicycling => "bicycling",
        }
    }

    fn detect(lower: &str) -> Self {
        let has_word = |w: &str| lower.split(|c: char| !c.is_alphanumeric()).any(|t| t == w);
        if has_word("walk") || has_word("walking") || lower.contains("on foot") {
            TravelMode::Walking
        } else if has_word("drive") || has_word("driving") || has_word("car") {
            TravelMode::Driving
        } else if has_word("bike") || has_word("cycle") || has_word("cycling") || has_word("bicycle") {
            TravelMode::Bicycling
        } else {
            TravelMode::Transit
        }
    }
}

impl fmt::Display for TravelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The structured reading of a request.
///
/// # Example
///
/// ```rust
/// use wayfinder::query::{ParsedQuery, TravelMode};
///
/// let parsed = ParsedQuery::parse("public transport to Times Square");
/// assert_eq!(parsed.destination.as_deref(), Some("Times Square"));
/// assert_eq!(parsed.origin_hint, None);
/// assert_eq!(parsed.mode, TravelMode::Transit);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Where the traveller wants to go, if the request names a place.
    pub destination: Option<String>,
    /// An explicit starting point, overriding the resolved location.
    pub origin_hint: Option<String>,
    /// Requested travel mode.
    pub mode: TravelMode,
}

impl ParsedQuery {
    /// Parse a free-text request. Never fails.
    pub fn parse(query: &str) -> Self {
        let text = query.trim();
        // ASCII lowering keeps byte offsets aligned with `text`.
        let lower = text.to_ascii_lowercase();
        let mode = TravelMode::detect(&lower);

        if text.is_empty() {
            return Self { mode, ..Self::default() };
        }

        for prefix in DESTINATION_PREFIXES {
            if lower == prefix.trim_end() {
                return Self { mode, ..Self::default() };
            }
            if lower.starts_with(prefix) {
                let rest = &text[prefix.len()..];
                return Self::split_trailing_origin(rest, mode);
            }
        }

        if let Some(idx) = lower.find(" to ") {
            let before = &text[..idx];
            let before_lower = &lower[..idx];
            let destination = clean(&text[idx + 4..]);
            let origin_hint = before_lower
                .rfind("from ")
                .filter(|&pos| pos == 0 || before_lower.as_bytes()[pos - 1] == b' ')
                .map(|pos| clean(&before[pos + 5..]))
                .filter(|s| !s.is_empty());
            return Self {
                destination: non_empty(destination),
                origin_hint,
                mode,
            };
        }

        let mut rest = text;
        let mut rest_lower = lower.as_str();
        loop {
            let Some(word) = MODE_WORDS.iter().find(|w| {
                rest_lower.starts_with(*w)
                    && rest_lower[w.len()..].chars().next().map_or(true, |c| !c.is_alphanumeric())
            }) else {
                break;
            };
            rest = rest[word.len()..].trim_start();
            rest_lower = rest_lower[word.len()..].trim_start();
        }

        Self {
            destination: non_empty(clean(rest)),
            origin_hint: None,
            mode,
        }
    }

    fn split_trailing_origin(rest: &str, mode: TravelMode) -> Self {
        let lower = rest.to_ascii_lowercase();
        match lower.find(" from ") {
            Some(idx) => Self {
                destination: non_empty(clean(&rest[..idx])),
                origin_hint: non_empty(clean(&rest[idx + 6..])),
                mode,
            },
            None => Self {
                destination: non_empty(clean(rest)),
                origin_hint: None,
                mode,
            },
        }
    }
}

fn clean(s: &str) -> String {
    s.trim()
        .trim_end_matches(|c: char| matches!(c, '?' | '!' | '.' | ','))
        .trim()
        .to_string()
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
