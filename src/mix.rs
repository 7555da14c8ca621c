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
use crate::audio::Output;
use crate::pattern::TrackDefinition;

/// Gain changes are smoothed over this ramp to avoid clicks.
const GAIN_RAMP_SEC: f64 = 0.01;

/// Per-track mutable mixing state. A track is audible when no track has
/// solo set (or this one has it) and it is not muted; its effective gain is
/// then the configured base volume times the user volume.
#[derive(Clone, Debug)]
pub struct TrackMixState {
    mute: bool,
    solo: bool,
    volume: f32,
    base_volume: f32,
}

impl TrackMixState {
    pub fn mute(&self) -> bool {
        self.mute
    }

    pub fn solo(&self) -> bool {
        self.solo
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn base_volume(&self) -> f32 {
        self.base_volume
    }
}

/// Resolves mute/solo/volume state into per-track gains. The track set is
/// small and static after construction, so ids live in a fixed table
/// scanned linearly instead of an associative map.
pub struct MixBus {
    ids: Vec<String>,
    states: Vec<TrackMixState>,
}

impl MixBus {
    /// Builds the bus from the track definitions; base volumes come from
    /// the configuration, user volumes start at 1.
    pub fn new(tracks: &[TrackDefinition]) -> MixBus {
        MixBus {
            ids: tracks.iter().map(|track| track.id().to_string()).collect(),
            states: tracks
                .iter()
                .map(|track| TrackMixState {
                    mute: false,
                    solo: false,
                    volume: 1.0,
                    base_volume: track.initial_volume(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.ids.iter().position(|known| known == id)
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub fn state(&self, index: usize) -> &TrackMixState {
        &self.states[index]
    }

    pub fn toggle_mute(&mut self, index: usize) {
        self.states[index].mute = !self.states[index].mute;
    }

    pub fn toggle_solo(&mut self, index: usize) {
        self.states[index].solo = !self.states[index].solo;
    }

    pub fn set_volume(&mut self, index: usize, volume: f32) {
        self.states[index].volume = volume.clamp(0.0, 1.0);
    }

    /// Pure resolution of every track's effective gain under the global
    /// solo set. Always considers the whole state vector, not just the
    /// track that changed.
    pub fn effective_gains(&self) -> Vec<f32> {
        let any_solo = self.states.iter().any(|state| state.solo);
        self.states
            .iter()
            .map(|state| {
                let audible = (!any_solo || state.solo) && !state.mute;
                if audible {
                    state.base_volume * state.volume
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// The single effective gain for one track, from the same rule.
    pub fn effective_gain(&self, index: usize) -> f32 {
        self.effective_gains()[index]
    }

    /// Applies the current gains to the output graph with a short smoothing
    /// ramp. The only side-effecting step of the bus.
    pub fn apply(&self, output: &mut dyn Output) {
        for (index, gain) in self.effective_gains().into_iter().enumerate() {
            output.set_track_gain(index, gain, GAIN_RAMP_SEC);
        }
    }
}
