// Organum analysis engine
//
// Contrapuntal statistics over per-voice event streams: voice pairs are
// synchronized into sampled simultaneities, consecutive sonorities are
// grouped into sliding-window n-grams, and occurrence counts accumulate in
// a mergeable, JSON-serializable store. The musical vocabulary (pitches,
// intervals, n-grams, comparators, token grammar) lives in organum_model;
// this crate owns the stateful machinery and the CLI.
//
// Layout:
// - align.rs: the two-lane stream aligner (event streams -> simultaneities)
// - builder.rs: sliding-window n-gram extraction, several n per pass
// - statistics.rs: the nested counting store, queries, merge, JSON round-trip
// - pipeline.rs: per-piece and corpus orchestration (rayon across pieces)
// - input.rs: the piece JSON format consumed by the CLI

pub mod align;
pub mod builder;
pub mod input;
pub mod pipeline;
pub mod statistics;
