// The token grammar: the one wire format the core defines.
//
// Interval token:  [quality][-]digits        "m-3", "P1", "10", "-3"
// Movement token:  [+|-][quality]digits      "+P4", "-m2", "1", "+2"
// N-gram string:   odd number (>= 3) of space-separated fields alternating
//                  vertical and movement tokens: "m3 +P4 m3".
//
// Statistics keys are stored as plain strings, so these parsers are the
// only way a stored key becomes a typed value again. Whether quality was
// heeded is sniffed from the first character of the first field: a quality
// letter means heeded, a digit or '-' means unheeded. That rule is part of
// the contract — any process must parse a key back into the same n-gram
// that produced it.
//
// Parsing failures are always fatal (`NonsensicalInput`): a corrupt key
// cannot be guessed.

use crate::error::{AnalysisError, Result};
use crate::interval::{Direction, Interval, Quality};
use crate::ngram::NGram;

/// Parse a single interval or movement token.
///
/// Direction comes from the sign: a leading '+' is ascending, a leading or
/// interior '-' is descending, and an unsigned token is a unison when its
/// size is 1, otherwise ascending.
pub fn parse_interval_token(token: &str) -> Result<Interval> {
    let bad = || AnalysisError::NonsensicalInput(format!("malformed interval token '{token}'"));

    let mut rest = token;
    let mut sign = None;
    if let Some(stripped) = rest.strip_prefix('+') {
        sign = Some(Direction::Ascending);
        rest = stripped;
    } else if let Some(stripped) = rest.strip_prefix('-') {
        sign = Some(Direction::Descending);
        rest = stripped;
    }

    let mut quality = None;
    if let Some(c) = rest.chars().next() {
        if let Some(q) = Quality::from_letter(c) {
            quality = Some(q);
            rest = &rest[1..];
        }
    }

    // Directed vertical form: the '-' sits between quality and size.
    if let Some(stripped) = rest.strip_prefix('-') {
        if sign.is_some() {
            return Err(bad());
        }
        sign = Some(Direction::Descending);
        rest = stripped;
    }

    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let size: u32 = rest.parse().map_err(|_| bad())?;
    if size == 0 {
        return Err(bad());
    }

    let direction = sign.unwrap_or(if size == 1 {
        Direction::Unison
    } else {
        Direction::Ascending
    });

    Ok(Interval::new(size, quality, direction))
}

/// Whether an n-gram string was rendered with quality heeded, sniffed from
/// its first character per the wire contract.
pub fn sniff_heed_quality(ngram: &str) -> Result<bool> {
    match ngram.trim_start().chars().next() {
        Some(c) if Quality::from_letter(c).is_some() => Ok(true),
        Some(c) if c.is_ascii_digit() || c == '-' => Ok(false),
        _ => Err(AnalysisError::NonsensicalInput(format!(
            "cannot sniff quality setting of n-gram '{ngram}'"
        ))),
    }
}

/// Parse a full n-gram string back into a typed `NGram`.
pub fn parse_ngram(ngram: &str) -> Result<NGram> {
    let fields: Vec<&str> = ngram.split_whitespace().collect();
    if fields.len() < 3 || fields.len() % 2 == 0 {
        return Err(AnalysisError::NonsensicalInput(format!(
            "an n-gram string needs an odd number (>= 3) of fields, got {} in '{ngram}'",
            fields.len()
        )));
    }

    let heed_quality = sniff_heed_quality(ngram)?;

    let mut intervals = Vec::with_capacity(fields.len() / 2 + 1);
    let mut movements = Vec::with_capacity(fields.len() / 2);
    for (i, field) in fields.iter().enumerate() {
        let interval = parse_interval_token(field)?;
        // A key mixes quality-heeded and unheeded fields only if corrupt.
        if interval.quality.is_some() != heed_quality {
            return Err(AnalysisError::NonsensicalInput(format!(
                "field '{field}' disagrees with the quality setting of '{ngram}'"
            )));
        }
        if i % 2 == 0 {
            intervals.push(interval);
        } else {
            movements.push(interval);
        }
    }

    NGram::new(intervals, movements, heed_quality)
}
