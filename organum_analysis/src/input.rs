// The piece JSON format consumed by the CLI.
//
// A piece file holds an optional title and one event list per voice,
// highest voice first. Each event is an offset/duration pair with a spelled
// pitch name, or null for a rest:
//
//   { "title": "Kyrie",
//     "voices": [
//       [ { "offset": 0.0, "duration": 1.0, "pitch": "G4" },
//         { "offset": 1.0, "duration": 1.0, "pitch": null } ],
//       [ { "offset": 0.0, "duration": 2.0, "pitch": "C4" } ] ] }
//
// This is the score-import boundary, so ordering is checked here: events in
// one voice must be sorted by offset and non-overlapping.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use organum_model::error::AnalysisError;
use organum_model::event::Event;
use organum_model::pitch::Pitch;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub offset: f64,
    pub duration: f64,
    /// Spelled pitch name ("C4", "F#3", "Bb2"), or null for a rest.
    pub pitch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PieceFile {
    pub title: Option<String>,
    /// Highest voice first.
    pub voices: Vec<Vec<EventRecord>>,
}

/// Load one piece file. The title falls back to the file stem.
pub fn load_piece(path: &Path) -> Result<(String, Vec<Vec<Event>>), Box<dyn std::error::Error>> {
    let text = fs::read_to_string(path)?;
    let fallback = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_string());
    let piece = piece_from_str(&text, &fallback)?;
    Ok(piece)
}

/// Parse a piece from its JSON text.
pub fn piece_from_str(
    text: &str,
    fallback_title: &str,
) -> Result<(String, Vec<Vec<Event>>), Box<dyn std::error::Error>> {
    let file: PieceFile = serde_json::from_str(text)?;
    let title = file.title.unwrap_or_else(|| fallback_title.to_string());

    let mut voices = Vec::with_capacity(file.voices.len());
    for (index, records) in file.voices.iter().enumerate() {
        let mut events: Vec<Event> = Vec::with_capacity(records.len());
        for record in records {
            let event = match &record.pitch {
                Some(name) => Event::note(record.offset, record.duration, Pitch::parse(name)?),
                None => Event::rest(record.offset, record.duration),
            };
            if let Some(previous) = events.last() {
                if event.offset < previous.offset {
                    return Err(AnalysisError::NonsensicalInput(format!(
                        "voice {index} of '{title}' is not sorted by offset"
                    ))
                    .into());
                }
                if event.offset < previous.end() {
                    return Err(AnalysisError::NonsensicalInput(format!(
                        "voice {index} of '{title}' has overlapping events"
                    ))
                    .into());
                }
            }
            events.push(event);
        }
        voices.push(events);
    }
    Ok((title, voices))
}
