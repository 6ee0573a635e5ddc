// The interval model: classification, rendering, inversion.
//
// An `Interval` is the relationship between two spelled pitches, reduced to
// three coordinates: generic size (3rd, 6th, 10th...), diatonic quality
// (diminished through augmented), and direction. The size is always stored
// positive; direction carries the sign. A *descending* vertical interval
// means the nominal upper voice sounds below the lower voice — the rest of
// the system treats that as voice crossing.
//
// Every interval has two renderings of its size:
// - compound: the actual generic size (a 10th is 10);
// - simple: reduced to within one octave, with exact octaves kept as 8
//   (a 10th is 3, a 15th is 8, a 9th is 2).
//
// Token forms follow the grammar in parse.rs: vertical intervals place the
// '-' between quality and size ("m-3"), melodic movements prefix it ("-m2").

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AnalysisError, Result};
use crate::pitch::Pitch;

/// Diatonic interval quality. Ordered from most contracted to most expanded,
/// which is also the sort rank the comparators use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    Diminished,
    Minor,
    Perfect,
    Major,
    Augmented,
}

impl Quality {
    pub fn letter(self) -> char {
        match self {
            Quality::Diminished => 'd',
            Quality::Minor => 'm',
            Quality::Perfect => 'P',
            Quality::Major => 'M',
            Quality::Augmented => 'A',
        }
    }

    pub fn from_letter(c: char) -> Option<Quality> {
        match c {
            'd' => Some(Quality::Diminished),
            'm' => Some(Quality::Minor),
            'P' => Some(Quality::Perfect),
            'M' => Some(Quality::Major),
            'A' => Some(Quality::Augmented),
            _ => None,
        }
    }
}

/// Which way an interval points. For vertical intervals, `Descending` means
/// the upper voice has crossed below the lower one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Unison,
    Descending,
}

/// Whether sizes larger than one octave are reduced to their single-octave
/// equivalent when rendering tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Simple,
    Compound,
}

/// A generic-size + quality + direction interval. `quality` is `None` only
/// for intervals reconstructed from quality-insensitive tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub size: u32,
    pub quality: Option<Quality>,
    pub direction: Direction,
}

/// Semitones spanned by the perfect/major form of each simple size, 1-7.
const DIATONIC_SEMITONES: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

impl Interval {
    pub fn new(size: u32, quality: Option<Quality>, direction: Direction) -> Interval {
        Interval {
            size,
            quality,
            direction,
        }
    }

    /// Classify the vertical interval between two spelled pitches.
    ///
    /// Generic size comes from the letter-step distance, quality from the
    /// half-step count relative to the diatonic default for that size, and
    /// direction from chromatic comparison: `upper` sounding below `lower`
    /// is `Descending` (voice crossing), equal height is `Unison`.
    pub fn classify(lower: &Pitch, upper: &Pitch) -> Result<Interval> {
        let steps = upper.diatonic_index() - lower.diatonic_index();
        let semis = upper.semitone() - lower.semitone();

        let direction = match semis.cmp(&0) {
            std::cmp::Ordering::Greater => Direction::Ascending,
            std::cmp::Ordering::Equal => Direction::Unison,
            std::cmp::Ordering::Less => Direction::Descending,
        };

        let size = steps.unsigned_abs() + 1;
        let expected = diatonic_default(size);
        let delta = semis.abs() - expected;

        let quality = if always_perfect(size) {
            match delta {
                -1 => Quality::Diminished,
                0 => Quality::Perfect,
                1 => Quality::Augmented,
                _ => return Err(quality_gap(lower, upper, delta)),
            }
        } else {
            match delta {
                -2 => Quality::Diminished,
                -1 => Quality::Minor,
                0 => Quality::Major,
                1 => Quality::Augmented,
                _ => return Err(quality_gap(lower, upper, delta)),
            }
        };

        Ok(Interval::new(size, Some(quality), direction))
    }

    /// Generic size reduced to within one octave, keeping exact octaves as 8:
    /// a 10th is 3, a 9th is 2, an octave or a 15th is 8, a unison is 1.
    pub fn simple_size(&self) -> u32 {
        let reduced = (self.size - 1) % 7 + 1;
        if reduced == 1 && self.size > 1 { 8 } else { reduced }
    }

    pub fn size_for(&self, granularity: Granularity) -> u32 {
        match granularity {
            Granularity::Simple => self.simple_size(),
            Granularity::Compound => self.size,
        }
    }

    pub fn is_voice_crossing(&self) -> bool {
        self.direction == Direction::Descending
    }

    /// Canonical token for this interval in vertical position: optional
    /// quality letter, then '-' if descending, then the size.
    /// "m-3", "P1", "10", "-3".
    pub fn vertical_token(&self, heed_quality: bool, granularity: Granularity) -> String {
        let mut out = String::new();
        if heed_quality {
            if let Some(q) = self.quality {
                out.push(q.letter());
            }
        }
        if self.direction == Direction::Descending {
            out.push('-');
        }
        out.push_str(&self.size_for(granularity).to_string());
        out
    }

    /// Canonical token for this interval in movement position: '+' or '-'
    /// direction prefix (none for unison), then optional quality letter,
    /// then the unsigned size. "+P4", "-m2", "1", "+2".
    pub fn movement_token(&self, heed_quality: bool, granularity: Granularity) -> String {
        let mut out = String::new();
        match self.direction {
            Direction::Ascending => out.push('+'),
            Direction::Descending => out.push('-'),
            Direction::Unison => {}
        }
        if heed_quality {
            if let Some(q) = self.quality {
                out.push(q.letter());
            }
        }
        out.push_str(&self.size_for(granularity).to_string());
        out
    }

    /// Diatonic inversion, for re-voicing an n-gram: the simple size maps to
    /// 9 minus itself, diminished and augmented swap, minor and major swap.
    /// Sizes that are always perfect never acquire a major/minor quality —
    /// an inversion landing on 4, 5, 8, or 1 stays perfect. Direction is
    /// preserved.
    pub fn invert(&self) -> Result<Interval> {
        let quality = self.quality.ok_or_else(|| {
            AnalysisError::MissingInformation(
                "cannot invert an interval with no quality".to_string(),
            )
        })?;

        let size = 9 - self.simple_size();
        let flipped = match quality {
            Quality::Diminished => Quality::Augmented,
            Quality::Augmented => Quality::Diminished,
            Quality::Minor => Quality::Major,
            Quality::Major => Quality::Minor,
            Quality::Perfect => Quality::Perfect,
        };
        let quality = if always_perfect(size) && matches!(flipped, Quality::Minor | Quality::Major)
        {
            Quality::Perfect
        } else {
            flipped
        };

        Ok(Interval::new(size, Some(quality), self.direction))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.vertical_token(true, Granularity::Compound))
    }
}

/// Semitones of the perfect/major form of a generic size.
fn diatonic_default(size: u32) -> i32 {
    let zero = size - 1;
    DIATONIC_SEMITONES[(zero % 7) as usize] + 12 * (zero / 7) as i32
}

/// Whether a generic size belongs to the perfect family (1, 4, 5, 8, 11,
/// 12, 15, ...), which never carries major/minor quality.
pub fn always_perfect(size: u32) -> bool {
    matches!((size - 1) % 7, 0 | 3 | 4)
}

fn quality_gap(lower: &Pitch, upper: &Pitch, delta: i32) -> AnalysisError {
    AnalysisError::MissingInformation(format!(
        "no diatonic quality spans {lower} to {upper} (off by {delta} half-steps)"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(lower: &str, upper: &str) -> Interval {
        Interval::classify(&Pitch::parse(lower).unwrap(), &Pitch::parse(upper).unwrap()).unwrap()
    }

    #[test]
    fn test_classify_common_intervals() {
        let m3 = iv("A4", "C5");
        assert_eq!(
            m3,
            Interval::new(3, Some(Quality::Minor), Direction::Ascending)
        );
        let p5 = iv("C4", "G4");
        assert_eq!(
            p5,
            Interval::new(5, Some(Quality::Perfect), Direction::Ascending)
        );
        let p1 = iv("C4", "C4");
        assert_eq!(
            p1,
            Interval::new(1, Some(Quality::Perfect), Direction::Unison)
        );
    }

    #[test]
    fn test_classify_respects_spelling() {
        // Same keys, different spellings: m3 vs A2.
        assert_eq!(iv("C4", "Eb4").quality, Some(Quality::Minor));
        assert_eq!(iv("C4", "Eb4").size, 3);
        assert_eq!(iv("C4", "D#4").quality, Some(Quality::Augmented));
        assert_eq!(iv("C4", "D#4").size, 2);
    }

    #[test]
    fn test_classify_voice_crossing() {
        let crossed = iv("A4", "E4");
        assert_eq!(crossed.direction, Direction::Descending);
        assert_eq!(crossed.size, 4);
        assert!(crossed.is_voice_crossing());
    }

    #[test]
    fn test_classify_compound() {
        let m10 = iv("A4", "C6");
        assert_eq!(m10.size, 10);
        assert_eq!(m10.quality, Some(Quality::Minor));
        assert_eq!(m10.simple_size(), 3);

        let octave = iv("C4", "C5");
        assert_eq!(octave.size, 8);
        assert_eq!(octave.simple_size(), 8);

        let fifteenth = iv("C4", "C6");
        assert_eq!(fifteenth.size, 15);
        assert_eq!(fifteenth.simple_size(), 8);
    }

    #[test]
    fn test_classify_unspellable_quality() {
        // C to Ebb is a doubly-diminished third for the perfect family rules;
        // the five-quality vocabulary cannot express C# to Ebb (a third, three
        // half-steps short of major).
        let lower = Pitch::parse("C#4").unwrap();
        let upper = Pitch::parse("Ebb4").unwrap();
        assert!(matches!(
            Interval::classify(&lower, &upper),
            Err(AnalysisError::MissingInformation(_))
        ));
    }

    #[test]
    fn test_vertical_tokens() {
        let m3 = iv("A4", "C5");
        assert_eq!(m3.vertical_token(true, Granularity::Compound), "m3");
        assert_eq!(m3.vertical_token(false, Granularity::Compound), "3");

        let down = iv("A4", "F#4");
        assert_eq!(down.vertical_token(true, Granularity::Compound), "m-3");
        assert_eq!(down.vertical_token(false, Granularity::Compound), "-3");

        let m10 = iv("A4", "C6");
        assert_eq!(m10.vertical_token(true, Granularity::Compound), "m10");
        assert_eq!(m10.vertical_token(true, Granularity::Simple), "m3");
    }

    #[test]
    fn test_movement_tokens() {
        let up4 = iv("C4", "F4");
        assert_eq!(up4.movement_token(true, Granularity::Compound), "+P4");
        assert_eq!(up4.movement_token(false, Granularity::Compound), "+4");

        let down2 = iv("D4", "C#4");
        assert_eq!(down2.movement_token(true, Granularity::Compound), "-m2");

        let stay = iv("C4", "C4");
        assert_eq!(stay.movement_token(true, Granularity::Compound), "P1");
        assert_eq!(stay.movement_token(false, Granularity::Compound), "1");
    }

    #[test]
    fn test_invert() {
        let m3 = Interval::new(3, Some(Quality::Minor), Direction::Ascending);
        let inv = m3.invert().unwrap();
        assert_eq!(inv.size, 6);
        assert_eq!(inv.quality, Some(Quality::Major));

        let p5 = Interval::new(5, Some(Quality::Perfect), Direction::Ascending);
        let inv = p5.invert().unwrap();
        assert_eq!(inv.size, 4);
        assert_eq!(inv.quality, Some(Quality::Perfect));

        // A major quality inverted onto a perfect-family size stays perfect,
        // never "minor 4th".
        let weird = Interval::new(5, Some(Quality::Minor), Direction::Ascending);
        let inv = weird.invert().unwrap();
        assert_eq!(inv.size, 4);
        assert_eq!(inv.quality, Some(Quality::Perfect));

        let a4 = Interval::new(4, Some(Quality::Augmented), Direction::Ascending);
        let inv = a4.invert().unwrap();
        assert_eq!(inv.size, 5);
        assert_eq!(inv.quality, Some(Quality::Diminished));

        let bare = Interval::new(3, None, Direction::Ascending);
        assert!(matches!(
            bare.invert(),
            Err(AnalysisError::MissingInformation(_))
        ));
    }

    #[test]
    fn test_invert_compound_reduces() {
        let m10 = Interval::new(10, Some(Quality::Minor), Direction::Ascending);
        let inv = m10.invert().unwrap();
        assert_eq!(inv.size, 6);
        assert_eq!(inv.quality, Some(Quality::Major));
    }

    #[test]
    fn test_always_perfect_family() {
        for size in [1, 4, 5, 8, 11, 12, 15] {
            assert!(always_perfect(size), "{size} should be perfect-family");
        }
        for size in [2, 3, 6, 7, 9, 10, 13, 14] {
            assert!(!always_perfect(size), "{size} should not be perfect-family");
        }
    }
}
