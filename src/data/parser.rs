//! Declination response parsing
//!
//! The upstream API has been observed to return the declination under
//! different envelopes depending on version and endpoint. Rather than probing
//! fields ad hoc, extraction walks an explicit ordered list of rules against
//! the parsed JSON document and takes the first match.

use serde_json::Value;

/// Where in a response document a declination may live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtractionRule {
    /// `{"<parent>": {"<field>": x}}`, or `{"<parent>": [{"<field>": x}, ...]}`
    Nested {
        parent: &'static str,
        field: &'static str,
    },
    /// `{"<field>": x}`
    TopLevel(&'static str),
}

/// Extraction rules in priority order
const EXTRACTION_RULES: [ExtractionRule; 3] = [
    ExtractionRule::Nested {
        parent: "result",
        field: "declination",
    },
    ExtractionRule::TopLevel("declination"),
    ExtractionRule::TopLevel("declination_value"),
];

impl ExtractionRule {
    fn apply(&self, document: &Value) -> Option<f64> {
        match self {
            ExtractionRule::Nested { parent, field } => {
                let container = document.get(*parent)?;
                // NOAA's calculator wraps results in an array of one object
                let container = match container {
                    Value::Array(items) => items.first()?,
                    other => other,
                };
                container.get(*field).and_then(coerce_number)
            }
            ExtractionRule::TopLevel(field) => document.get(*field).and_then(coerce_number),
        }
    }
}

/// Coerce a JSON scalar to a float. Numbers pass through, numeric strings are
/// parsed, everything else (null, bool, objects, non-numeric text) is rejected.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Extract the declination from a parsed response body.
///
/// Returns `None` if the document is not an object or no rule yields a number.
/// The value is returned as found; range validation is the caller's concern.
pub fn extract_declination(document: &Value) -> Option<f64> {
    if !document.is_object() {
        return None;
    }
    EXTRACTION_RULES.iter().find_map(|rule| rule.apply(document))
}
