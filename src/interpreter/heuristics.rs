//! Field classification and candidate scoring
//!
//! Everything in here is a pure function of a field's key and value. The
//! candidate scores are expressed as ordered rule tables so a rule can be
//! added or re-weighted without touching the interpreter itself.

use serde_json::Value;

/// Key fragments that mark a numeric field as bookkeeping rather than a measurement
const NON_MEASUREMENT_KEYS: &[&str] = &["id", "time", "stamp", "date", "count", "index"];

/// Key fragments that hint at a measured quantity
const MEASUREMENT_KEYS: &[&str] = &[
    "value",
    "reading",
    "measurement",
    "level",
    "amount",
    "temperature",
    "pressure",
];

/// Key fragments that mark a string field as naming a device
const IDENTIFIER_KEY_HINTS: &[&str] = &["id", "device", "equipment", "node", "unit", "machine"];

/// Key fragments that strongly name a device
const IDENTIFIER_KEYS: &[&str] = &["id", "device", "equipment", "node", "unit"];

/// Key fragments that describe what kind of thing is reporting
const DESCRIPTION_KEYS: &[&str] = &["type", "kind", "category", "class", "name"];

const STATUS_KEYS: &[&str] = &["status", "state", "health", "condition"];

const TIMESTAMP_KEYS: &[&str] = &["time", "stamp", "date"];

const DATETIME_MARKERS: &[char] = &['T', 'Z', ':', '-', '+'];

/// Range in which a number is considered a plausible sensor reading
const PLAUSIBLE_READING_MIN: f64 = -1000.0;
const PLAUSIBLE_READING_MAX: f64 = 10000.0;

/// Longest string still considered a short identifier
const SHORT_IDENTIFIER_LEN: usize = 20;

/// Longest topic segment still considered an identifier
const SHORT_SEGMENT_LEN: usize = 10;

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Whether a numeric field carries bookkeeping (ids, counters, times) instead of a reading
pub fn is_bookkeeping_key(key: &str) -> bool {
    contains_any(&key.to_lowercase(), NON_MEASUREMENT_KEYS)
}

/// Whether a string field names a device
///
/// Either the key hints at it, or the value is short and made of word
/// characters.
pub fn looks_like_identifier(key: &str, value: &str) -> bool {
    if contains_any(&key.to_lowercase(), IDENTIFIER_KEY_HINTS) {
        return true;
    }

    value.chars().count() <= SHORT_IDENTIFIER_LEN && (is_alphanumeric(value) || value.contains('_'))
}

/// Whether a string looks like a date/time literal
pub fn looks_like_datetime(value: &str) -> bool {
    value.chars().count() > SHORT_SEGMENT_LEN && value.contains(DATETIME_MARKERS)
}

/// Whether a topic segment looks like an instance identifier (`"1"`, `"pump_a"`)
pub fn looks_like_topic_identifier(segment: &str) -> bool {
    if is_digits(segment) {
        return true;
    }

    if segment.chars().count() > SHORT_SEGMENT_LEN {
        return false;
    }

    let stripped: String = segment.chars().filter(|c| *c != '_').collect();
    is_alphanumeric(&stripped)
}

pub fn is_status_key(key: &str) -> bool {
    contains_any(&key.to_lowercase(), STATUS_KEYS)
}

pub fn is_timestamp_key(key: &str) -> bool {
    contains_any(&key.to_lowercase(), TIMESTAMP_KEYS)
}

/// Non-empty and made only of decimal digits
pub fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

fn is_alphanumeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(char::is_alphanumeric)
}

/// One weighted rule of a scoring strategy
pub struct ScoringRule {
    pub name: &'static str,
    pub applies: fn(&str, &Value) -> bool,
    pub weight: f64,
}

/// A base score plus the rules that raise it
pub struct ScoringStrategy {
    pub base: f64,
    pub rules: &'static [ScoringRule],
}

impl ScoringStrategy {
    /// Score a field; rules see the lower-cased key
    pub fn score(&self, key: &str, value: &Value) -> f64 {
        let key = key.to_lowercase();
        self.rules
            .iter()
            .filter(|rule| (rule.applies)(&key, value))
            .fold(self.base, |score, rule| score + rule.weight)
    }
}

fn measurement_key(key: &str, _: &Value) -> bool {
    contains_any(key, MEASUREMENT_KEYS)
}

fn plausible_reading(_: &str, value: &Value) -> bool {
    value
        .as_f64()
        .is_some_and(|n| (PLAUSIBLE_READING_MIN..=PLAUSIBLE_READING_MAX).contains(&n))
}

fn identifier_key(key: &str, _: &Value) -> bool {
    contains_any(key, IDENTIFIER_KEYS)
}

fn short_value(_: &str, value: &Value) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.chars().count() <= SHORT_IDENTIFIER_LEN)
}

fn description_key(key: &str, _: &Value) -> bool {
    contains_any(key, DESCRIPTION_KEYS)
}

/// Ranks numeric fields as the reading's main value
pub const MAIN_VALUE: ScoringStrategy = ScoringStrategy {
    base: 0.5,
    rules: &[
        ScoringRule {
            name: "measurement key",
            applies: measurement_key,
            weight: 0.3,
        },
        ScoringRule {
            name: "plausible reading",
            applies: plausible_reading,
            weight: 0.2,
        },
    ],
};

/// Ranks identifier-like strings as the equipment identifier
pub const IDENTIFIER: ScoringStrategy = ScoringStrategy {
    base: 0.3,
    rules: &[
        ScoringRule {
            name: "identifier key",
            applies: identifier_key,
            weight: 0.4,
        },
        ScoringRule {
            name: "short value",
            applies: short_value,
            weight: 0.2,
        },
    ],
};

/// Ranks free-text strings as a description of the sensor
pub const DESCRIPTION: ScoringStrategy = ScoringStrategy {
    base: 0.2,
    rules: &[ScoringRule {
        name: "description key",
        applies: description_key,
        weight: 0.3,
    }],
};
