/*!
    Timestamp bookkeeping for delivered frames.
*/

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::debug;

use vio_types::{Frame, Pts, Rational};

/// Frames held back to restore presentation order.
pub(crate) const REORDER_DEPTH: usize = 2;

/**
    Small window that releases frames in presentation order.
*/
#[derive(Debug)]
pub(crate) struct ReorderBuffer {
    pending: VecDeque<Frame>,
    depth: usize,
}

impl ReorderBuffer {
    pub fn new(depth: usize) -> Self {
        Self {
            pending: VecDeque::with_capacity(depth + 1),
            depth,
        }
    }

    /**
        Add a frame; returns the earliest frame once more than `depth` are
        held. Frames with equal timestamps keep their arrival order.
    */
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let key = presentation_key(&frame);
        let at = self.pending.partition_point(|f| presentation_key(f) <= key);
        self.pending.insert(at, frame);
        if self.pending.len() > self.depth {
            self.pending.pop_front()
        } else {
            None
        }
    }

    /**
        Release every held frame in order.
    */
    pub fn drain(&mut self) -> Vec<Frame> {
        self.pending.drain(..).collect()
    }
}

/// Timestamps compared across time bases.
fn presentation_key(frame: &Frame) -> i128 {
    if frame.time_base.is_valid() {
        frame.pts.0 as i128 * frame.time_base.num as i128 * 1_000_000_000 / frame.time_base.den as i128
    } else {
        frame.pts.0 as i128
    }
}

/**
    Maps session timestamps to the caller's timeline.

    The caller's time base is the one of the first frame ever delivered.
    After [`begin_session`](Self::begin_session) the next frame is placed one
    nominal frame interval after the last delivered one, and later frames
    keep their spacing relative to it. Delivered timestamps never decrease and
    every frame gets the next sequence number.
*/
#[derive(Debug)]
pub(crate) struct TimestampRebaser {
    frame_rate: Rational,
    time_base: Option<Rational>,
    frame_interval: i64,
    offset: i64,
    last: Option<i64>,
    rebase_pending: bool,
    next_sequence: u64,
}

impl TimestampRebaser {
    pub fn new(frame_rate: Rational) -> Self {
        Self {
            frame_rate,
            time_base: None,
            frame_interval: 1,
            offset: 0,
            last: None,
            rebase_pending: false,
            next_sequence: 0,
        }
    }

    /**
        A new session starts; its timestamps are unrelated to the old ones.
    */
    pub fn begin_session(&mut self) {
        if self.last.is_some() {
            self.rebase_pending = true;
        }
    }

    pub fn apply(&mut self, mut frame: Frame) -> Frame {
        let time_base = match self.time_base {
            Some(time_base) => time_base,
            None => {
                self.time_base = Some(frame.time_base);
                if self.frame_rate.is_valid() && frame.time_base.is_valid() {
                    self.frame_interval =
                        Rational::rescale(1, self.frame_rate.invert(), frame.time_base).max(1);
                }
                frame.time_base
            }
        };

        let pts = Rational::rescale(frame.pts.0, frame.time_base, time_base);
        if self.rebase_pending {
            if let Some(last) = self.last {
                self.offset = last + self.frame_interval - pts;
                debug!(offset = self.offset, "rebased timestamps of new session");
            }
            self.rebase_pending = false;
        }

        let mut pts = pts + self.offset;
        if let Some(last) = self.last {
            if pts < last {
                debug!(pts, last, "clamping late frame");
                pts = last;
            }
        }
        self.last = Some(pts);

        frame.pts = Pts(pts);
        frame.time_base = time_base;
        frame.sequence = self.next_sequence;
        self.next_sequence += 1;
        frame
    }
}

/**
    Counts consecutive failures that happened within a sliding window.
*/
#[derive(Debug)]
pub(crate) struct ErrorWindow {
    tolerance: u32,
    window: Duration,
    failures: VecDeque<Instant>,
}

impl ErrorWindow {
    pub fn new(tolerance: u32, window: Duration) -> Self {
        Self {
            tolerance: tolerance.max(1),
            window,
            failures: VecDeque::new(),
        }
    }

    /**
        Record a failure. Returns true once the tolerance is reached.
    */
    pub fn record_failure(&mut self, now: Instant) -> bool {
        while let Some(&oldest) = self.failures.front() {
            if now.duration_since(oldest) > self.window {
                self.failures.pop_front();
            } else {
                break;
            }
        }
        self.failures.push_back(now);
        self.failures.len() >= self.tolerance as usize
    }

    pub fn record_success(&mut self) {
        self.failures.clear();
    }

    pub fn failures(&self) -> usize {
        self.failures.len()
    }
}
