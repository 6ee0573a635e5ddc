// Sliding-window n-gram extraction over a simultaneity sequence.
//
// The builder holds one window per requested n, so several window sizes are
// filled in a single pass over the aligner's output. A window only ever
// contains sounding simultaneities: a rest clears every window, which is
// what guarantees that no n-gram spans across a rest.
//
// Melodic movements are classified here, between the lower-voice pitches of
// consecutive surviving verticals, not taken from the aligner: movement is
// defined strictly between verticals that passed the rest filter.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use tracing::trace;

use organum_model::error::{AnalysisError, Result};
use organum_model::interval::Interval;
use organum_model::ngram::NGram;
use organum_model::pitch::Pitch;

use crate::align::{Simultaneity, SimultaneityKind};

/// An n-gram together with the offset of its first vertical.
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedNGram {
    pub offset: f64,
    pub ngram: NGram,
}

/// One sliding buffer per requested n. Feed simultaneities in offset order;
/// completed windows come back as n-grams.
pub struct NGramBuilder {
    windows: BTreeMap<usize, VecDeque<(f64, Interval, Pitch)>>,
    heed_quality: bool,
}

impl NGramBuilder {
    /// `n_values` must be non-empty and each n at least 2.
    pub fn new(n_values: &[usize], heed_quality: bool) -> Result<NGramBuilder> {
        if n_values.is_empty() {
            return Err(AnalysisError::NonsensicalInput(
                "at least one n value is required".to_string(),
            ));
        }
        let mut windows = BTreeMap::new();
        for &n in n_values {
            if n < 2 {
                return Err(AnalysisError::NonsensicalInput(format!(
                    "an n-gram window needs n >= 2, got {n}"
                )));
            }
            windows.insert(n, VecDeque::with_capacity(n));
        }
        Ok(NGramBuilder {
            windows,
            heed_quality,
        })
    }

    pub fn n_values(&self) -> impl Iterator<Item = usize> + '_ {
        self.windows.keys().copied()
    }

    /// Consume one simultaneity, returning every n-gram completed by it.
    /// A rest clears all windows and emits nothing.
    pub fn feed(&mut self, simultaneity: &Simultaneity) -> Result<Vec<EmittedNGram>> {
        let SimultaneityKind::Sounding { interval, lower, .. } = &simultaneity.kind else {
            trace!(offset = simultaneity.offset, "rest clears n-gram windows");
            for window in self.windows.values_mut() {
                window.clear();
            }
            return Ok(Vec::new());
        };

        let mut emitted = Vec::new();
        for (&n, window) in &mut self.windows {
            window.push_back((simultaneity.offset, *interval, *lower));
            if window.len() < n {
                continue;
            }
            let verticals: Vec<(Interval, Pitch)> =
                window.iter().map(|&(_, iv, low)| (iv, low)).collect();
            let ngram = NGram::from_verticals(&verticals, self.heed_quality)?;
            emitted.push(EmittedNGram {
                offset: window[0].0,
                ngram,
            });
            window.pop_front();
        }
        Ok(emitted)
    }
}
