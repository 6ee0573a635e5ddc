// Organum model crate
//
// The shared vocabulary for contrapuntal analysis: spelled pitches, voice
// events, the interval model, n-grams of vertical intervals, the musical
// comparators, and the token grammar that serves as the system's only wire
// format. No I/O lives here; the analysis engine (organum_analysis) builds
// on these types.
//
// Layout:
// - pitch.rs: spelled pitch (letter/accidental/octave), name parsing
// - event.rs: per-voice sounding/rest spans handed over by a score importer
// - interval.rs: classification, simple/compound rendering, inversion
// - ngram.rs: n-gram value object with quality-sensitive equality
// - compare.rs: total orders over interval and n-gram token strings
// - parse.rs: token grammar parser (tokens -> typed values)
// - error.rs: the error taxonomy shared by the whole system

pub mod compare;
pub mod error;
pub mod event;
pub mod interval;
pub mod ngram;
pub mod parse;
pub mod pitch;

pub use error::{AnalysisError, Result};
