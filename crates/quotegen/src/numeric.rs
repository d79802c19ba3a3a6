//! Best-effort numeric extraction from free-form cell text.

use once_cell::sync::Lazy;
use regex::Regex;

/// First run of decimal digits (any script) and dots
static NUMBER_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\d.]+").unwrap());

static DECIMAL_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d$").unwrap());

/// Pull a number out of text such as `"Qty: 12.5 pcs"` or `"1.234.56"`.
///
/// Only the first run of digits and dots counts. Digits from any script are
/// accepted, so Arabic-Indic `"١٢"` reads as `12`. When the run has several
/// dots the first one is the decimal separator and the rest are dropped, so
/// `"1.234.56"` reads as `1.23456`. Missing, empty or digit-free text yields
/// `0.0`. A leading minus sign is never part of the run, so the result is
/// never negative.
///
/// ```
/// use quotegen::extract_number;
///
/// assert_eq!(extract_number(Some("Qty: 12.5 pcs")), 12.5);
/// assert_eq!(extract_number(Some("n/a")), 0.0);
/// assert_eq!(extract_number(None), 0.0);
/// ```
pub fn extract_number(text: Option<&str>) -> f64 {
    let text = match text.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return 0.0,
    };
    let run = match NUMBER_RUN.find(text) {
        Some(m) => m.as_str(),
        None => return 0.0,
    };

    let mut candidate = String::with_capacity(run.len());
    let mut seen_dot = false;
    for c in run.chars() {
        match c {
            '.' if seen_dot => {}
            '.' => {
                seen_dot = true;
                candidate.push('.');
            }
            _ => candidate.extend(ascii_digit(c)),
        }
    }
    candidate.parse::<f64>().unwrap_or(0.0)
}

/// ASCII form of a decimal digit from any script.
///
/// Unicode lays out every decimal digit set as ten consecutive code points
/// from zero to nine, so the value is the distance from the start of the
/// run of digit code points, modulo ten.
fn ascii_digit(c: char) -> Option<char> {
    if c.is_ascii_digit() {
        return Some(c);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut zero = c as u32;
    while let Some(prev) = zero.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        zero -= 1;
    }
    char::from_digit((c as u32 - zero) % 10, 10)
}

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DECIMAL_DIGIT.is_match(c.encode_utf8(&mut buf))
}
