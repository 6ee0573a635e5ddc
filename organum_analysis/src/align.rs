// The stream aligner: two voices, one clock.
//
// Takes two per-voice event streams and merges them into an ordered
// sequence of simultaneities sampled at a configurable granularity. This is
// the stateful heart of the system: each voice is a lane holding the most
// recently sounding event and the offset where its next boundary falls, and
// a shared clock jumps from boundary to boundary.
//
// The awkward cases this machine exists for:
// - melisma / pedal point: one voice moves while the other sustains. The
//   emitted simultaneity carries the sustaining lane's current event, so
//   every sampled point sees both voices.
// - long notes: an event that starts off the sampling grid but spans past
//   the next grid point must still be promoted, or it would be skipped
//   entirely; its lane then reports the change at the next grid point.
// - sampling grid: offsets that are not a multiple of the sample interval
//   update lane state but emit nothing.
// - degenerate input: zero-duration events cannot stall the clock; a
//   non-advancing step is forced forward by a minimum epsilon rather than
//   treated as an error.

use tracing::{debug, trace};

use organum_model::error::{AnalysisError, Result};
use organum_model::event::Event;
use organum_model::interval::Interval;
use organum_model::pitch::Pitch;

/// Minimum clock advance when event boundaries fail to make progress.
const EPSILON_STEP: f64 = 0.001;

/// Tolerance for float comparisons against offsets and the sampling grid.
const GRID_TOLERANCE: f64 = 1e-6;

/// What a sampled moment holds for a voice pair.
#[derive(Debug, Clone, PartialEq)]
pub enum SimultaneityKind {
    /// At least one voice is silent (or has not started yet).
    Rest,
    /// Both voices sound; the interval between them, with the contributing
    /// pitches kept for later melodic-movement classification.
    Sounding {
        interval: Interval,
        lower: Pitch,
        upper: Pitch,
    },
}

/// One sampled time point for a voice pair. Produced in offset order;
/// the sequence is append-only for the duration of one pair analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct Simultaneity {
    pub offset: f64,
    pub kind: SimultaneityKind,
}

impl Simultaneity {
    pub fn is_rest(&self) -> bool {
        matches!(self.kind, SimultaneityKind::Rest)
    }
}

/// Per-voice lane state.
struct Lane<'a> {
    events: &'a [Event],
    cursor: usize,
    most_recent: Option<Event>,
    next_boundary: f64,
    /// A change promoted off the grid, waiting to be reported at the next
    /// grid point.
    pending: bool,
}

impl<'a> Lane<'a> {
    fn new(events: &'a [Event]) -> Lane<'a> {
        Lane {
            events,
            cursor: 0,
            most_recent: None,
            next_boundary: events.first().map(|e| e.offset).unwrap_or(f64::INFINITY),
            pending: false,
        }
    }

    /// Consume events that have started by `current` and report whether the
    /// lane's sounding state changed at a sampled point. Off the grid, an
    /// event is promoted only when it spans past the next grid point (it
    /// would otherwise never be seen); the change is then held as pending
    /// and reported at the next on-grid round.
    fn advance(&mut self, current: f64, sample_interval: f64, on_grid: bool) -> bool {
        let mut candidate = None;
        while let Some(event) = self.events.get(self.cursor) {
            if event.offset <= current + GRID_TOLERANCE {
                candidate = Some(*event);
                self.cursor += 1;
            } else {
                break;
            }
        }

        let Some(event) = candidate else {
            // Nothing started here. If the clock has passed our boundary,
            // aim at the next event start so the clock can jump to it.
            if self.next_boundary <= current + GRID_TOLERANCE {
                self.next_boundary = self
                    .events
                    .get(self.cursor)
                    .map(|e| e.offset)
                    .unwrap_or(f64::INFINITY);
            }
            return if on_grid {
                std::mem::take(&mut self.pending)
            } else {
                false
            };
        };

        // The event occupies offset space whether or not it is promoted.
        self.next_boundary = event.end();

        if !on_grid {
            let previous_grid_point =
                ((current + GRID_TOLERANCE) / sample_interval).floor() * sample_interval;
            let spans_grid = event.end() > previous_grid_point + sample_interval + GRID_TOLERANCE;
            if !spans_grid {
                return false;
            }
        }

        // A change of kind (pitch vs rest) or of pitch counts as an update;
        // re-promoting the same sound only refreshes the lane state.
        let updated = match &self.most_recent {
            None => true,
            Some(previous) => previous.pitch.pitch() != event.pitch.pitch(),
        };
        self.most_recent = Some(event);
        if on_grid {
            updated || std::mem::take(&mut self.pending)
        } else {
            self.pending |= updated;
            false
        }
    }

    fn exhausted(&self) -> bool {
        self.cursor >= self.events.len()
    }
}

/// Merge two event streams into sampled simultaneities.
///
/// `upper` is the nominally higher voice; intervals are classified from the
/// lower voice up, so an upper pitch sounding below the lower one comes out
/// descending (voice crossing). A non-positive `sample_interval` is
/// nonsensical. Classification failures (pitch pairs the quality vocabulary
/// cannot express) abort the whole pair, with no retry.
pub fn align(upper: &[Event], lower: &[Event], sample_interval: f64) -> Result<Vec<Simultaneity>> {
    if !(sample_interval > 0.0) || !sample_interval.is_finite() {
        return Err(AnalysisError::NonsensicalInput(format!(
            "sample interval must be positive and finite, got {sample_interval}"
        )));
    }
    if upper.is_empty() || lower.is_empty() {
        return Ok(Vec::new());
    }

    let end = upper
        .iter()
        .chain(lower)
        .map(Event::end)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut upper_lane = Lane::new(upper);
    let mut lower_lane = Lane::new(lower);
    let mut simultaneities = Vec::new();
    let mut current = upper_lane.next_boundary.min(lower_lane.next_boundary);

    while current < end - GRID_TOLERANCE {
        let on_grid = on_sampling_grid(current, sample_interval);
        let upper_updated = upper_lane.advance(current, sample_interval, on_grid);
        let lower_updated = lower_lane.advance(current, sample_interval, on_grid);

        if on_grid && (upper_updated || lower_updated) {
            let kind = match (&upper_lane.most_recent, &lower_lane.most_recent) {
                (Some(upper_event), Some(lower_event)) => {
                    match (upper_event.pitch.pitch(), lower_event.pitch.pitch()) {
                        (Some(upper_pitch), Some(lower_pitch)) => {
                            let interval = Interval::classify(&lower_pitch, &upper_pitch)?;
                            SimultaneityKind::Sounding {
                                interval,
                                lower: lower_pitch,
                                upper: upper_pitch,
                            }
                        }
                        _ => SimultaneityKind::Rest,
                    }
                }
                // A lane that has seen no event yet counts as silent.
                _ => SimultaneityKind::Rest,
            };
            trace!(offset = current, ?kind, "simultaneity");
            simultaneities.push(Simultaneity {
                offset: current,
                kind,
            });
        }

        // Jump to the nearest event boundary or grid point, forcing a
        // minimum step if neither advances (back-to-back zero-duration
        // events).
        let next_grid =
            (((current + GRID_TOLERANCE) / sample_interval).floor() + 1.0) * sample_interval;
        let potential = upper_lane
            .next_boundary
            .min(lower_lane.next_boundary)
            .min(next_grid);
        if potential <= current + GRID_TOLERANCE {
            current += EPSILON_STEP;
        } else {
            current = potential;
        }
    }

    debug!(
        count = simultaneities.len(),
        upper_exhausted = upper_lane.exhausted(),
        lower_exhausted = lower_lane.exhausted(),
        "alignment finished"
    );
    Ok(simultaneities)
}

/// Whether an offset lies on a multiple of the sampling interval.
fn on_sampling_grid(offset: f64, sample_interval: f64) -> bool {
    let nearest = (offset / sample_interval).round() * sample_interval;
    (offset - nearest).abs() < GRID_TOLERANCE
}
