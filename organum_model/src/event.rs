// Per-voice events, as handed over by a score importer.
//
// The core never reads notation files itself: it consumes one ordered
// sequence of events per voice, each event a sounding or silent span.
// Events in one voice are non-overlapping and sorted by offset, and are
// never mutated after import.

use serde::{Deserialize, Serialize};

use crate::pitch::Pitch;

/// What a voice is doing for the span of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PitchOrRest {
    Pitch(Pitch),
    Rest,
}

impl PitchOrRest {
    pub fn is_rest(&self) -> bool {
        matches!(self, PitchOrRest::Rest)
    }

    pub fn pitch(&self) -> Option<Pitch> {
        match self {
            PitchOrRest::Pitch(p) => Some(*p),
            PitchOrRest::Rest => None,
        }
    }
}

/// One sounding or silent span in a single voice. Offsets and durations are
/// in abstract beat units (a quarter note is 1.0 by convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub offset: f64,
    pub duration: f64,
    pub pitch: PitchOrRest,
}

impl Event {
    pub fn note(offset: f64, duration: f64, pitch: Pitch) -> Event {
        Event {
            offset,
            duration,
            pitch: PitchOrRest::Pitch(pitch),
        }
    }

    pub fn rest(offset: f64, duration: f64) -> Event {
        Event {
            offset,
            duration,
            pitch: PitchOrRest::Rest,
        }
    }

    /// Offset at which the next event in this voice may begin.
    pub fn end(&self) -> f64 {
        self.offset + self.duration
    }
}
