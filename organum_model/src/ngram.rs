// N-grams of vertical intervals.
//
// An n-gram is a window of n vertical intervals plus the n-1 melodic
// movements of the lower voice connecting them. It is a value object: once
// built, only the cached token string may change (when `heed_quality` is
// toggled), never the intervals themselves.
//
// Equality is deliberately asymmetric in precision: two n-grams are only
// comparable when their `heed_quality` flags agree. With quality heeded,
// every vertical and movement must match exactly; with quality unheeded,
// only generic sizes and directions count, so "m3 P1 m3" and "M3 P1 M3"
// collapse into one bucket. Deduplication in the statistics store depends
// on this behavior.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AnalysisError, Result};
use crate::interval::{Direction, Granularity, Interval};
use crate::pitch::Pitch;

/// A window of `n` vertical intervals and the lower voice's `n - 1`
/// connecting movements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NGram {
    intervals: Vec<Interval>,
    movements: Vec<Interval>,
    heed_quality: bool,
    /// Cached compound rendering at the current `heed_quality`.
    token: String,
}

impl NGram {
    /// Build from explicit verticals and movements. The movement list must
    /// be exactly one shorter than the interval list, and at least two
    /// verticals are required.
    pub fn new(
        intervals: Vec<Interval>,
        movements: Vec<Interval>,
        heed_quality: bool,
    ) -> Result<NGram> {
        if intervals.len() < 2 {
            return Err(AnalysisError::NonsensicalInput(format!(
                "an n-gram needs at least 2 vertical intervals, got {}",
                intervals.len()
            )));
        }
        if movements.len() != intervals.len() - 1 {
            return Err(AnalysisError::NonsensicalInput(format!(
                "{} vertical intervals need {} movements, got {}",
                intervals.len(),
                intervals.len() - 1,
                movements.len()
            )));
        }
        let mut ng = NGram {
            intervals,
            movements,
            heed_quality,
            token: String::new(),
        };
        ng.token = ng.token_string(heed_quality, Granularity::Compound);
        Ok(ng)
    }

    /// Build from verticals paired with their lower-voice pitches; the
    /// movements are classified between consecutive lower pitches.
    pub fn from_verticals(verticals: &[(Interval, Pitch)], heed_quality: bool) -> Result<NGram> {
        let intervals: Vec<Interval> = verticals.iter().map(|(iv, _)| *iv).collect();
        let mut movements = Vec::with_capacity(verticals.len().saturating_sub(1));
        for pair in verticals.windows(2) {
            movements.push(Interval::classify(&pair[0].1, &pair[1].1)?);
        }
        NGram::new(intervals, movements, heed_quality)
    }

    /// The number of vertical intervals in this n-gram.
    pub fn n(&self) -> usize {
        self.intervals.len()
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn movements(&self) -> &[Interval] {
        &self.movements
    }

    pub fn heed_quality(&self) -> bool {
        self.heed_quality
    }

    /// Toggle quality sensitivity, re-deriving the cached token string.
    pub fn set_heed_quality(&mut self, heed_quality: bool) {
        if self.heed_quality != heed_quality {
            self.heed_quality = heed_quality;
            self.token = self.token_string(heed_quality, Granularity::Compound);
        }
    }

    /// Render the space-separated token string: vertical, movement,
    /// vertical, ... always an odd number of fields.
    pub fn token_string(&self, heed_quality: bool, granularity: Granularity) -> String {
        let mut out = String::new();
        for (i, vertical) in self.intervals.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&vertical.vertical_token(heed_quality, granularity));
            if let Some(movement) = self.movements.get(i) {
                out.push(' ');
                out.push_str(&movement.movement_token(heed_quality, granularity));
            }
        }
        out
    }

    /// The cached compound rendering at this n-gram's own quality setting.
    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// The "canonical non-crossed" form: the token string with every
    /// direction sign removed. Beware: "m3 M2 m3" matches both the crossed
    /// and uncrossed realizations, which are not experientially similar.
    pub fn canonical(&self) -> String {
        self.token.replace(['-', '+'], "")
    }

    /// True if any vertical interval is descending (voices crossed).
    pub fn has_voice_crossing(&self) -> bool {
        self.intervals.iter().any(|iv| iv.is_voice_crossing())
    }

    /// The same n-gram read backwards: verticals reversed, movements
    /// reversed with their directions flipped.
    pub fn retrograde(&self) -> NGram {
        let intervals: Vec<Interval> = self.intervals.iter().rev().copied().collect();
        let movements: Vec<Interval> = self
            .movements
            .iter()
            .rev()
            .map(|m| Interval::new(m.size, m.quality, flip(m.direction)))
            .collect();
        // Lengths are preserved, so reconstruction cannot fail.
        NGram::new(intervals, movements, self.heed_quality).expect("retrograde preserves shape")
    }

    /// Re-voice the n-gram by diatonically inverting every vertical
    /// interval; movements are unchanged. Fails if any vertical has no
    /// quality to invert.
    pub fn inverted(&self) -> Result<NGram> {
        let intervals = self
            .intervals
            .iter()
            .map(Interval::invert)
            .collect::<Result<Vec<Interval>>>()?;
        NGram::new(intervals, self.movements.clone(), self.heed_quality)
    }
}

impl fmt::Display for NGram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}

impl PartialEq for NGram {
    fn eq(&self, other: &NGram) -> bool {
        if self.heed_quality != other.heed_quality || self.n() != other.n() {
            return false;
        }
        if self.heed_quality {
            self.intervals == other.intervals && self.movements == other.movements
        } else {
            let generic = |a: &[Interval], b: &[Interval]| {
                a.iter()
                    .zip(b)
                    .all(|(x, y)| x.size == y.size && x.direction == y.direction)
            };
            generic(&self.intervals, &other.intervals)
                && generic(&self.movements, &other.movements)
        }
    }
}

fn flip(direction: Direction) -> Direction {
    match direction {
        Direction::Ascending => Direction::Descending,
        Direction::Descending => Direction::Ascending,
        Direction::Unison => Direction::Unison,
    }
}
