//! Lookahead metronome scheduler.
//!
//! A coarse wall-clock tick wakes the scheduler; each pass books every
//! click that falls inside the lookahead window on the output clock. Click
//! times come from an absolute accumulator advanced by exactly one beat
//! per click, so late or doubled wakeups never shift the grid.

use crate::song::seconds_per_beat;
use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::debug;

/// One scheduled click.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Click {
    /// 1-indexed position in the bar.
    pub beat: u32,
    /// Output-clock time of the attack.
    pub at: f64,
    /// Whether this is beat 1.
    pub is_downbeat: bool,
}

/// Generates click events ahead of the output clock.
#[derive(Debug)]
pub struct MetronomeScheduler {
    interval: Duration,
    lookahead: f64,
    ticker: Option<Receiver<Instant>>,
    next_click_time: f64,
    /// Beat number of the last click booked, 0 before the first.
    last_beat: u32,
    /// Beat number of the last click whose time has passed.
    current_beat: u32,
    booked: VecDeque<Click>,
}

impl MetronomeScheduler {
    /// Creates an idle scheduler.
    ///
    /// # Arguments
    ///
    /// * `interval` - Wall-clock period of the scheduling tick
    /// * `lookahead` - Output-clock seconds booked ahead of now
    pub fn new(interval: Duration, lookahead: f64) -> Self {
        Self {
            interval,
            lookahead,
            ticker: None,
            next_click_time: 0.0,
            last_beat: 0,
            current_beat: 0,
            booked: VecDeque::new(),
        }
    }

    /// Returns true between [`start`](Self::start) and [`stop`](Self::stop).
    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }

    /// Starts counting from beat 1 with the first click at `now`.
    ///
    /// Starting a running scheduler does nothing.
    pub fn start(&mut self, now: f64) -> bool {
        if self.is_running() {
            return false;
        }
        self.ticker = Some(crossbeam_channel::tick(self.interval));
        self.next_click_time = now;
        self.last_beat = 0;
        self.current_beat = 0;
        self.booked.clear();
        debug!(at = now, "Metronome started");
        true
    }

    /// Stops the tick and forgets booked clicks. The next start counts
    /// from beat 1 again.
    pub fn stop(&mut self) -> bool {
        if self.ticker.take().is_none() {
            return false;
        }
        self.last_beat = 0;
        self.current_beat = 0;
        self.booked.clear();
        debug!("Metronome stopped");
        true
    }

    /// Returns true if the wall-clock tick fired since the last call.
    ///
    /// Several missed ticks collapse into one.
    pub fn tick_due(&self) -> bool {
        self.ticker
            .as_ref()
            .map(|ticker| ticker.try_iter().count() > 0)
            .unwrap_or(false)
    }

    /// Books every click due before `now + lookahead`.
    ///
    /// # Arguments
    ///
    /// * `now` - Current output-clock time
    /// * `bpm` - Song tempo in beats per minute; the playback rate does not apply
    /// * `beats_per_bar` - Bar length the beat number cycles over
    ///
    /// # Returns
    ///
    /// The clicks booked by this pass, in time order.
    pub fn schedule_ahead(&mut self, now: f64, bpm: f64, beats_per_bar: u32) -> Vec<Click> {
        let beat_len = seconds_per_beat(bpm);
        if !self.is_running() || beat_len <= 0.0 {
            return Vec::new();
        }

        let beats_per_bar = beats_per_bar.max(1);
        let mut clicks = Vec::new();
        while self.next_click_time < now + self.lookahead {
            let beat = (self.last_beat % beats_per_bar) + 1;
            let click = Click {
                beat,
                at: self.next_click_time,
                is_downbeat: beat == 1,
            };
            self.last_beat = beat;
            self.next_click_time += beat_len;
            self.booked.push_back(click);
            clicks.push(click);
        }
        clicks
    }

    /// Moves the current beat up to the latest booked click at or before
    /// `now`.
    ///
    /// # Returns
    ///
    /// The new beat, if it changed.
    pub fn advance(&mut self, now: f64) -> Option<u32> {
        let mut reached = None;
        while let Some(click) = self.booked.front() {
            if click.at > now {
                break;
            }
            reached = Some(click.beat);
            self.booked.pop_front();
        }
        let beat = reached?;
        self.current_beat = beat;
        Some(beat)
    }

    /// Beat of the most recent click heard, 0 when idle.
    pub fn current_beat(&self) -> u32 {
        self.current_beat
    }

    /// Output-clock time of the next click to be booked.
    pub fn next_click_time(&self) -> f64 {
        self.next_click_time
    }
}
