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
pub mod bars;
pub mod onset;

pub use bars::{BarAligner, BarStartTable};
pub use onset::{detect_beats, Detection};

/// A candidate beat onset detected in the click track. Produced by the
/// detector, consumed by the aligner and then discarded.
#[derive(Clone, Copy, Debug)]
pub struct BeatPoint {
    /// Position in input-track seconds.
    pub time_sec: f64,
    /// Onset strength, the positive first difference of the smoothed
    /// amplitude envelope.
    pub strength: f32,
    /// Ratio of sample-to-sample variation to absolute amplitude near the
    /// peak; sharp click transients score high.
    pub brightness: f32,
}
