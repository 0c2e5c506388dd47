use serde_json::{Map, Value};

use super::heuristics::{
    DESCRIPTION, IDENTIFIER, MAIN_VALUE, is_bookkeeping_key, looks_like_datetime,
    looks_like_identifier,
};

/// A payload field together with its ranking score
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate<'a> {
    pub key: &'a str,
    pub value: &'a Value,
    pub score: f64,
}

/// Payload fields bucketed by shape, plus ranked candidates for each role
///
/// Candidate lists are sorted by descending score; equal scores keep payload
/// order.
#[derive(Debug, Default)]
pub struct PayloadAnalysis<'a> {
    pub field_count: usize,
    pub numeric_fields: Vec<(&'a str, &'a Value)>,
    pub string_fields: Vec<(&'a str, &'a str)>,
    pub datetime_fields: Vec<(&'a str, &'a str)>,
    pub object_fields: Vec<(&'a str, &'a Value)>,
    pub array_fields: Vec<(&'a str, &'a Value)>,
    pub main_value_candidates: Vec<Candidate<'a>>,
    pub identifier_candidates: Vec<Candidate<'a>>,
    pub description_candidates: Vec<Candidate<'a>>,
}

impl<'a> PayloadAnalysis<'a> {
    pub fn analyze(payload: &'a Map<String, Value>) -> Self {
        let mut analysis = Self {
            field_count: payload.len(),
            ..Default::default()
        };

        for (key, value) in payload {
            let key = key.as_str();
            match value {
                Value::Number(_) => {
                    analysis.numeric_fields.push((key, value));
                    if !is_bookkeeping_key(key) {
                        analysis.main_value_candidates.push(Candidate {
                            key,
                            value,
                            score: MAIN_VALUE.score(key, value),
                        });
                    }
                }
                Value::String(text) => {
                    analysis.string_fields.push((key, text));
                    if looks_like_identifier(key, text) {
                        analysis.identifier_candidates.push(Candidate {
                            key,
                            value,
                            score: IDENTIFIER.score(key, value),
                        });
                    } else if looks_like_datetime(text) {
                        analysis.datetime_fields.push((key, text));
                    } else {
                        analysis.description_candidates.push(Candidate {
                            key,
                            value,
                            score: DESCRIPTION.score(key, value),
                        });
                    }
                }
                Value::Object(_) => analysis.object_fields.push((key, value)),
                Value::Array(_) => analysis.array_fields.push((key, value)),
                Value::Bool(_) | Value::Null => {}
            }
        }

        rank(&mut analysis.main_value_candidates);
        rank(&mut analysis.identifier_candidates);
        rank(&mut analysis.description_candidates);

        analysis
    }

    pub fn best_main_value(&self) -> Option<&Candidate<'a>> {
        self.main_value_candidates.first()
    }

    pub fn best_identifier(&self) -> Option<&Candidate<'a>> {
        self.identifier_candidates.first()
    }

    pub fn best_description(&self) -> Option<&Candidate<'a>> {
        self.description_candidates.first()
    }
}

fn rank(candidates: &mut [Candidate<'_>]) {
    // stable, so ties keep payload order
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
}
