// Spelled pitches.
//
// Interval classification needs more than a MIDI number: a minor third and
// an augmented second occupy the same keys but are different intervals. A
// `Pitch` therefore keeps its spelling — letter, accidental, octave — and
// derives two independent coordinates from it:
//
// - `semitone()`: chromatic height (MIDI convention, C4 = 60), which decides
//   interval quality and direction.
// - `diatonic_index()`: letter-step height (C0 = 0, one step per letter),
//   which decides generic interval size.
//
// Pitch names use the compact spelling the rest of the system prints:
// letter, zero or more '#'/'b', octave. "C4", "F#3", "Gbb2", "B-1".

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AnalysisError, Result};

/// The seven letter names, in C-major scale order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Letter {
    C = 0,
    D = 1,
    E = 2,
    F = 3,
    G = 4,
    A = 5,
    B = 6,
}

impl Letter {
    pub const ALL: [Letter; 7] = [
        Letter::C,
        Letter::D,
        Letter::E,
        Letter::F,
        Letter::G,
        Letter::A,
        Letter::B,
    ];

    /// Scale position within the octave, 0-6.
    pub fn step(self) -> i32 {
        self as i32
    }

    /// Semitones above C for the natural form of this letter.
    pub fn natural_semitone(self) -> i32 {
        const SEMIS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];
        SEMIS[self as usize]
    }

    pub fn from_char(c: char) -> Option<Letter> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }
}

/// A spelled pitch. `accidental` is in half-steps: -2 (double flat) to
/// +2 (double sharp). Octaves follow scientific pitch notation (C4 = middle C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    pub letter: Letter,
    pub accidental: i8,
    pub octave: i8,
}

impl Pitch {
    pub fn new(letter: Letter, accidental: i8, octave: i8) -> Pitch {
        Pitch {
            letter,
            accidental,
            octave,
        }
    }

    /// Parse a name like "C4", "F#3", "Gbb2", or "B-1".
    pub fn parse(name: &str) -> Result<Pitch> {
        let bad = || AnalysisError::MissingInformation(format!("cannot spell pitch '{name}'"));

        let mut chars = name.chars();
        let letter = chars.next().and_then(Letter::from_char).ok_or_else(bad)?;

        let rest: &str = &name[1..];
        let mut accidental: i8 = 0;
        let mut idx = 0;
        for c in rest.chars() {
            match c {
                '#' => accidental += 1,
                'b' => accidental -= 1,
                _ => break,
            }
            idx += 1;
        }
        if accidental.abs() > 2 {
            return Err(bad());
        }

        let octave: i8 = rest[idx..].parse().map_err(|_| bad())?;
        Ok(Pitch::new(letter, accidental, octave))
    }

    /// Chromatic height, MIDI convention: C4 = 60.
    pub fn semitone(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.letter.natural_semitone() + self.accidental as i32
    }

    /// Letter-step height: one unit per diatonic step, C0 = 0.
    pub fn diatonic_index(&self) -> i32 {
        self.octave as i32 * 7 + self.letter.step()
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter.as_char())?;
        let mark = if self.accidental >= 0 { '#' } else { 'b' };
        for _ in 0..self.accidental.abs() {
            write!(f, "{mark}")?;
        }
        write!(f, "{}", self.octave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        for name in ["C4", "F#3", "Gbb2", "A#5", "B-1", "Ebb0"] {
            let p = Pitch::parse(name).unwrap();
            assert_eq!(p.to_string(), name, "round-trip of {name}");
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for name in ["H4", "C", "C###4", "4C", ""] {
            assert!(Pitch::parse(name).is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn test_semitone_midi_convention() {
        assert_eq!(Pitch::parse("C4").unwrap().semitone(), 60);
        assert_eq!(Pitch::parse("A4").unwrap().semitone(), 69);
        assert_eq!(Pitch::parse("C#4").unwrap().semitone(), 61);
        assert_eq!(Pitch::parse("Db4").unwrap().semitone(), 61);
        assert_eq!(Pitch::parse("B3").unwrap().semitone(), 59);
    }

    #[test]
    fn test_enharmonics_differ_diatonically() {
        let cs = Pitch::parse("C#4").unwrap();
        let db = Pitch::parse("Db4").unwrap();
        assert_eq!(cs.semitone(), db.semitone());
        assert_ne!(cs.diatonic_index(), db.diatonic_index());
    }

    #[test]
    fn test_diatonic_index_steps() {
        let c4 = Pitch::parse("C4").unwrap();
        let e4 = Pitch::parse("E4").unwrap();
        let c5 = Pitch::parse("C5").unwrap();
        assert_eq!(e4.diatonic_index() - c4.diatonic_index(), 2);
        assert_eq!(c5.diatonic_index() - c4.diatonic_index(), 7);
    }
}
