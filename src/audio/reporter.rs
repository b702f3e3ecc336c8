//! Time reporter: turns the output clock into the song position shown to
//! consumers.

use super::transport::{PlaybackState, Transport};

/// Result of sampling the song position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeSample {
    /// The position to display, in song seconds.
    Position(f64),
    /// Playback reached the end of the song; the transport should stop.
    EndOfSong,
}

/// Samples the song position at output-clock time `now`.
///
/// Outside of playback the stored position is returned unchanged, so
/// repeated samples never drift.
pub fn sample(transport: &Transport, now: f64) -> TimeSample {
    if transport.state() != PlaybackState::Playing {
        return TimeSample::Position(transport.displayed_time());
    }

    let time = transport.virtual_time(now);
    let duration = transport.duration();
    if duration > 0.0 && time >= duration {
        TimeSample::EndOfSong
    } else {
        TimeSample::Position(time.max(0.0))
    }
}
