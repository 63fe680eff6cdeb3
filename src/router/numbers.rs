//! Spoken quantity extraction
//!
//! ASR output mixes spelled-out Spanish numbers ("dos metros", "medio metro")
//! with digits ("45 grados", "2.5 metros"). Everything here is pure and
//! table-driven.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Spelled-out quantities understood by the router
const WORD_NUMBERS: &[(&str, f64)] = &[
    ("cero", 0.0),
    ("medio", 0.5),
    ("media", 0.5),
    ("un", 1.0),
    ("uno", 1.0),
    ("una", 1.0),
    ("dos", 2.0),
    ("tres", 3.0),
    ("cuatro", 4.0),
    ("cinco", 5.0),
    ("seis", 6.0),
    ("siete", 7.0),
    ("ocho", 8.0),
    ("nueve", 9.0),
    ("diez", 10.0),
    ("once", 11.0),
    ("doce", 12.0),
    ("quince", 15.0),
    ("veinte", 20.0),
    ("veinticinco", 25.0),
    ("treinta", 30.0),
    ("cuarenta", 40.0),
    ("cuarenta y cinco", 45.0),
    ("cincuenta", 50.0),
    ("sesenta", 60.0),
    ("setenta", 70.0),
    ("ochenta", 80.0),
    ("noventa", 90.0),
    ("cien", 100.0),
    ("ciento", 100.0),
    ("ciento veinte", 120.0),
    ("ciento ochenta", 180.0),
    ("doscientos", 200.0),
    ("trescientos", 300.0),
    ("trescientos sesenta", 360.0),
];

/// Tens that combine with a unit through "y" ("cuarenta y cinco")
const TENS: &[(&str, f64)] = &[
    ("treinta", 30.0),
    ("cuarenta", 40.0),
    ("cincuenta", 50.0),
    ("sesenta", 60.0),
    ("setenta", 70.0),
    ("ochenta", 80.0),
    ("noventa", 90.0),
];

const UNITS: &[(&str, f64)] = &[
    ("uno", 1.0),
    ("una", 1.0),
    ("un", 1.0),
    ("dos", 2.0),
    ("tres", 3.0),
    ("cuatro", 4.0),
    ("cinco", 5.0),
    ("seis", 6.0),
    ("siete", 7.0),
    ("ocho", 8.0),
    ("nueve", 9.0),
];

/// Alternation of every spelled-out quantity, longest first so that
/// "ciento ochenta" wins over "ciento"
static WORD_ALTERNATION: LazyLock<String> = LazyLock::new(|| {
    let mut words: Vec<&str> = WORD_NUMBERS.iter().map(|(w, _)| *w).collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.len()));
    words
        .iter()
        .map(|w| regex::escape(w))
        .collect::<Vec<_>>()
        .join("|")
});

static DISTANCE: LazyLock<Regex> = LazyLock::new(|| quantity_regex("metros?"));

static ANGLE: LazyLock<Regex> = LazyLock::new(|| quantity_regex("grados?"));

static FULL_TURN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:vuelta completa|giro completo|una vuelta|360)\b")
        .expect("valid regex")
});

static HALF_TURN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bmedia vuelta\b").expect("valid regex"));

static QUARTER_TURN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcuarto de vuelta\b").expect("valid regex"));

static DECIMAL_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+),(\d+)").expect("valid regex"));

static COMPOUND_TENS: LazyLock<Regex> = LazyLock::new(|| {
    let tens = TENS.iter().map(|(w, _)| *w).collect::<Vec<_>>().join("|");
    let units = UNITS.iter().map(|(w, _)| *w).collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"(?i)\b({tens})\s+y\s+({units})\b")).expect("valid regex")
});

static AND_A_HALF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(\d+(?:\.\d+)?|{})(\s+(?:metros?|grados?))?\s+y\s+medi[oa]\b(\s+\w+)?",
        *WORD_ALTERNATION
    ))
    .expect("valid regex")
});

fn quantity_regex(unit: &str) -> Regex {
    Regex::new(&format!(
        r"(?i)(?:\b(?P<digits>\d+(?:[.,]\d+)?)|\b(?P<word>{}))\s*(?:de\s+)?{unit}\b",
        *WORD_ALTERNATION
    ))
    .expect("valid regex")
}

fn word_value(word: &str) -> Option<f64> {
    let word = word.to_lowercase();
    WORD_NUMBERS
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, v)| *v)
}

fn table_value(table: &[(&str, f64)], word: &str) -> f64 {
    let word = word.to_lowercase();
    table
        .iter()
        .find(|(w, _)| *w == word)
        .map_or(0.0, |(_, v)| *v)
}

fn parse_literal(literal: &str) -> Option<f64> {
    literal.replace(',', ".").parse().ok()
}

/// Render a quantity the way it would be spoken back as digits
#[must_use]
pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Collapse multi-word quantities into numeric literals
///
/// Runs before compound splitting: "cuarenta y cinco grados" and
/// "un metro y medio" contain the connective "y" and would otherwise be cut
/// into two fragments. Decimal commas ("2,5") become decimal points for the
/// same reason.
#[must_use]
pub fn normalize(text: &str) -> Cow<'_, str> {
    let mut out = DECIMAL_COMMA.replace_all(text, "${1}.${2}");

    if COMPOUND_TENS.is_match(&out) {
        out = Cow::Owned(
            COMPOUND_TENS
                .replace_all(&out, |caps: &Captures<'_>| {
                    let value = table_value(TENS, &caps[1]) + table_value(UNITS, &caps[2]);
                    format_quantity(value)
                })
                .into_owned(),
        );
    }

    if AND_A_HALF.is_match(&out) {
        out = Cow::Owned(
            AND_A_HALF
                .replace_all(&out, |caps: &Captures<'_>| {
                    let next = caps.get(3).map_or("", |m| m.as_str());
                    // "y media vuelta" is a second command, not a fraction
                    if next.trim().eq_ignore_ascii_case("vuelta") {
                        return caps[0].to_string();
                    }
                    let base = parse_literal(&caps[1])
                        .or_else(|| word_value(&caps[1]))
                        .unwrap_or(0.0);
                    let unit = caps.get(2).map_or("", |m| m.as_str());
                    format!("{}{unit}{next}", format_quantity(base + 0.5))
                })
                .into_owned(),
        );
    }

    out
}

fn extract(pattern: &Regex, text: &str) -> Option<f64> {
    let caps = pattern.captures(text)?;
    if let Some(digits) = caps.name("digits") {
        return parse_literal(digits.as_str());
    }
    caps.name("word").and_then(|w| word_value(w.as_str()))
}

/// Quantity followed by a distance unit ("dos metros", "0.5 metros")
#[must_use]
pub fn distance(text: &str) -> Option<f64> {
    extract(&DISTANCE, text)
}

/// Quantity followed by an angle unit ("45 grados", "noventa grados")
#[must_use]
pub fn angle(text: &str) -> Option<f64> {
    extract(&ANGLE, text)
}

/// Fixed turn phrases; checked before generic angle extraction
#[must_use]
pub fn special_turn(text: &str) -> Option<f64> {
    if FULL_TURN.is_match(text) {
        Some(360.0)
    } else if HALF_TURN.is_match(text) {
        Some(180.0)
    } else if QUARTER_TURN.is_match(text) {
        Some(90.0)
    } else {
        None
    }
}
