// Orchestration: aligner -> builder -> store, one voice pair at a time.
//
// A piece is analyzed single-threaded, pair by pair, into one store.
// Across pieces the work is embarrassingly parallel: each piece gets its
// own store, and the per-piece stores are combined with the store's merge,
// whose leaf counts are order-independent. Piece registry positions are
// assigned up front so per-piece counts land at the right index no matter
// which worker finishes first.

use rayon::prelude::*;
use tracing::{debug, info};

use organum_model::error::{AnalysisError, Result};
use organum_model::event::Event;
use organum_model::interval::Granularity;
use organum_model::ngram::NGram;

use crate::align::{SimultaneityKind, align};
use crate::builder::{EmittedNGram, NGramBuilder};
use crate::statistics::StatisticsStore;

/// Knobs for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisSettings {
    /// Sampling granularity in beat units ("every half-beat" is 0.5).
    pub sample_interval: f64,
    /// Window sizes to extract, all in one pass.
    pub n_values: Vec<usize>,
    /// Whether built n-grams carry diatonic quality in their tokens.
    pub heed_quality: bool,
}

impl Default for AnalysisSettings {
    fn default() -> AnalysisSettings {
        AnalysisSettings {
            sample_interval: 0.5,
            n_values: vec![2],
            heed_quality: false,
        }
    }
}

impl AnalysisSettings {
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_interval > 0.0) || !self.sample_interval.is_finite() {
            return Err(AnalysisError::NonsensicalInput(format!(
                "sample interval must be positive and finite, got {}",
                self.sample_interval
            )));
        }
        if self.n_values.is_empty() || self.n_values.iter().any(|&n| n < 2) {
            return Err(AnalysisError::NonsensicalInput(format!(
                "n values must be non-empty and each at least 2, got {:?}",
                self.n_values
            )));
        }
        Ok(())
    }
}

/// One n-gram found in a piece, located for a score exporter: where it
/// starts, which voice pair produced it, and how often its token occurs
/// across the whole analyzed corpus.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub offset: f64,
    pub upper_voice: usize,
    pub lower_voice: usize,
    pub ngram: NGram,
    pub occurrences: u64,
}

/// The outcome of analyzing one piece.
#[derive(Debug, Clone)]
pub struct PieceAnalysis {
    pub store: StatisticsStore,
    pub annotations: Vec<Annotation>,
}

/// The outcome of analyzing a corpus: one merged store plus per-piece
/// annotation lists, parallel to the input order.
#[derive(Debug, Clone)]
pub struct CorpusAnalysis {
    pub store: StatisticsStore,
    pub annotations: Vec<Vec<Annotation>>,
}

/// Run one voice pair through the aligner and builder, counting every
/// sounding interval and every emitted n-gram into `store` under `piece`.
pub fn analyze_pair(
    upper: &[Event],
    lower: &[Event],
    piece: usize,
    settings: &AnalysisSettings,
    store: &mut StatisticsStore,
) -> Result<Vec<EmittedNGram>> {
    let simultaneities = align(upper, lower, settings.sample_interval)?;
    let mut builder = NGramBuilder::new(&settings.n_values, settings.heed_quality)?;

    let mut all = Vec::new();
    for simultaneity in &simultaneities {
        if let SimultaneityKind::Sounding { interval, .. } = &simultaneity.kind {
            store.add_interval(interval, piece);
        }
        let emitted = builder.feed(simultaneity)?;
        for e in &emitted {
            store.add_ngram(&e.ngram, piece);
        }
        all.extend(emitted);
    }
    debug!(
        simultaneities = simultaneities.len(),
        ngrams = all.len(),
        "voice pair analyzed"
    );
    Ok(all)
}

/// Analyze every ordered voice pair of one piece into a fresh store.
/// Voices are given highest-first; for each pair the earlier voice is the
/// nominal upper one. Annotation counts are resolved against this piece's
/// own store.
pub fn analyze_piece(
    voices: &[Vec<Event>],
    name: &str,
    settings: &AnalysisSettings,
) -> Result<PieceAnalysis> {
    settings.validate()?;
    if voices.len() < 2 {
        return Err(AnalysisError::NonsensicalInput(format!(
            "a piece needs at least 2 voices, got {}",
            voices.len()
        )));
    }

    let mut store = StatisticsStore::new();
    let piece = store.add_piece(name);
    let mut annotations = Vec::new();
    for upper_voice in 0..voices.len() {
        for lower_voice in upper_voice + 1..voices.len() {
            let emitted = analyze_pair(
                &voices[upper_voice],
                &voices[lower_voice],
                piece,
                settings,
                &mut store,
            )?;
            annotations.extend(emitted.into_iter().map(|e| Annotation {
                offset: e.offset,
                upper_voice,
                lower_voice,
                ngram: e.ngram,
                occurrences: 0,
            }));
        }
    }
    resolve_occurrences(&mut annotations, &store)?;
    info!(
        name,
        voices = voices.len(),
        ngrams = annotations.len(),
        "piece analyzed"
    );
    Ok(PieceAnalysis { store, annotations })
}

/// Analyze a corpus of pieces in parallel and merge the per-piece stores.
/// Annotation counts are re-resolved against the merged store, so they
/// reflect the whole corpus.
pub fn analyze_pieces(
    pieces: &[(String, Vec<Vec<Event>>)],
    settings: &AnalysisSettings,
) -> Result<CorpusAnalysis> {
    settings.validate()?;
    let analyses: Vec<PieceAnalysis> = pieces
        .par_iter()
        .map(|(name, voices)| analyze_piece(voices, name, settings))
        .collect::<Result<Vec<PieceAnalysis>>>()?;

    let mut store = StatisticsStore::new();
    let mut annotations = Vec::with_capacity(analyses.len());
    for (index, mut analysis) in analyses.into_iter().enumerate() {
        analysis.store.shift_pieces(index);
        store.merge_from(analysis.store);
        annotations.push(analysis.annotations);
    }
    for list in &mut annotations {
        resolve_occurrences(list, &store)?;
    }
    Ok(CorpusAnalysis { store, annotations })
}

/// Fill in each annotation's corpus-wide occurrence count at compound
/// granularity, respecting the n-gram's own quality setting.
fn resolve_occurrences(annotations: &mut [Annotation], store: &StatisticsStore) -> Result<()> {
    for annotation in annotations {
        annotation.occurrences =
            store.ngram_occurrences(annotation.ngram.as_str(), Granularity::Compound)?;
    }
    Ok(())
}
