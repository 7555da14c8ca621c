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
use serde::Deserialize;

/// A YAML representation of a track.
#[derive(Deserialize)]
pub(super) struct Track {
    /// The stable identifier used by the mixing commands.
    id: String,
    /// The user-facing label. Defaults to the id.
    label: Option<String>,
    /// The locator passed to the loader, e.g. a file path relative to the
    /// session file.
    file: String,
    /// The initial volume in [0, 1]. Defaults to 1.
    volume: Option<f32>,
    /// Whether this track is the metronome click used for bar analysis.
    click: Option<bool>,
}

impl Track {
    /// Converts this track configuration into a track definition.
    pub(super) fn to_track_definition(&self) -> crate::pattern::TrackDefinition {
        crate::pattern::TrackDefinition::new(
            &self.id,
            self.label.as_deref().unwrap_or(&self.id),
            &self.file,
            self.volume.unwrap_or(1.0),
            self.click.unwrap_or(false),
        )
    }
}
