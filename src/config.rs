// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::pattern::TrackDefinition;
use crate::tempo::TempoRange;

mod pattern;
mod tempo;
mod track;

/// A YAML representation of a practice session.
#[derive(Deserialize)]
struct Session {
    /// The tracks to play, in mixer order.
    tracks: Vec<track::Track>,
    /// The bar pattern of the piece.
    pattern: pattern::Pattern,
    /// The practice tempo range. Defaults to 80 bpm in [60, 100] with a
    /// step of 2.
    tempo: Option<tempo::Tempo>,
}

/// A parsed practice session: the domain-typed contents of a session file.
pub struct ParsedSession {
    tracks: Vec<TrackDefinition>,
    pattern: crate::pattern::Pattern,
    tempo_range: TempoRange,
}

impl ParsedSession {
    pub fn tracks(&self) -> &[TrackDefinition] {
        &self.tracks
    }

    pub fn pattern(&self) -> &crate::pattern::Pattern {
        &self.pattern
    }

    pub fn tempo_range(&self) -> TempoRange {
        self.tempo_range
    }

    /// Consumes the session, yielding the pieces the engine constructor
    /// takes.
    pub fn into_parts(self) -> (Vec<TrackDefinition>, crate::pattern::Pattern, TempoRange) {
        (self.tracks, self.pattern, self.tempo_range)
    }
}

/// Parses a practice session from a YAML file.
pub fn parse_session(file: &Path) -> Result<ParsedSession, Box<dyn Error>> {
    match session_from_str(&fs::read_to_string(file)?) {
        Ok(session) => Ok(session),
        Err(e) => Err(format!("error parsing file {}: {}", file.display(), e).into()),
    }
}

/// Parses a practice session from YAML content.
pub fn session_from_str(content: &str) -> Result<ParsedSession, Box<dyn Error>> {
    let session: Session = serde_yml::from_str(content)?;
    if session.tracks.is_empty() {
        return Err("session must contain at least one track".into());
    }

    let tracks: Vec<TrackDefinition> = session
        .tracks
        .iter()
        .map(|track| track.to_track_definition())
        .collect();
    let pattern = session.pattern.to_pattern()?;
    let tempo_range = match &session.tempo {
        Some(tempo) => tempo.to_tempo_range()?,
        None => TempoRange::default(),
    };

    Ok(ParsedSession {
        tracks,
        pattern,
        tempo_range,
    })
}

#[cfg(test)]
mod test {
    use super::session_from_str;

    const SESSION: &str = "
tracks:
  - id: click
    label: Click
    file: click.wav
    click: true
  - id: drums
    file: drums.wav
    volume: 0.8
pattern:
  bars: [70, 71, 72, 74]
  two_beat_bars: [72]
  tempo_hints:
    72: 60.0
tempo:
  base: 80
  min: 60
  max: 100
  step: 2
";

    #[test]
    fn test_parse_session() {
        let session = session_from_str(SESSION).expect("session should parse");

        let tracks = session.tracks();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].id(), "click");
        assert_eq!(tracks[0].label(), "Click");
        assert!(tracks[0].is_click());
        assert_eq!(tracks[1].label(), "drums");
        assert_eq!(tracks[1].initial_volume(), 0.8);
        assert!(!tracks[1].is_click());

        assert_eq!(session.pattern().display_bars(), &[70, 71, 72, 74]);
        assert_eq!(session.pattern().beats_in(2), 2);
        assert_eq!(session.pattern().tempo_hint(2), Some(60.0));

        assert_eq!(session.tempo_range().base(), 80);
    }

    #[test]
    fn test_tempo_defaults() {
        let session = session_from_str(
            "
tracks:
  - id: click
    file: click.wav
pattern:
  bars: [1, 2]
",
        )
        .expect("session should parse");

        assert_eq!(session.tempo_range(), crate::tempo::TempoRange::default());
    }

    #[test]
    fn test_invalid_sessions() {
        assert!(session_from_str("tracks: []\npattern:\n  bars: [1]").is_err());
        assert!(session_from_str(
            "
tracks:
  - id: click
    file: click.wav
pattern:
  bars: [2, 1]
",
        )
        .is_err());
        assert!(session_from_str(
            "
tracks:
  - id: click
    file: click.wav
pattern:
  bars: [1, 2]
tempo:
  base: 81
  min: 60
  max: 100
  step: 2
",
        )
        .is_err());
    }
}
