// Copyright (c) 2025 The VFlow Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Vegas: delay-based congestion control for reliable byte streams.
//!
//! The sender runs on top of a transport that never loses data, so the
//! classic loss signal does not exist. The only symptom of an oversized
//! window is buffer bloat: socket buffers, NIC rings and middlebox
//! queues absorb the excess and round-trip times inflate far beyond the
//! path's propagation delay.
//!
//! This controller follows the TCP Vegas family. It takes the lowest
//! round trip ever observed as the wire latency, measures how far probe
//! round trips rise above it, and sizes the congestion window so the
//! self-induced queueing delay stays inside a small band. Latency that
//! the sender's own backlog adds is modeled separately (`extra_buffer`)
//! and subtracted from each sample before it is judged.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::CongestionController;
use super::CongestionStats;
use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::Config;

/// Pongs to collect before the congestion window is adjusted. Fewer
/// samples are too noisy to act on.
const ADJUSTMENT_SAMPLES: u32 = 3;

/// Floor for the idle timeout in milliseconds. A crude stand-in for a
/// real retransmission timeout estimator.
const MIN_IDLE_TIMEOUT: u64 = 100;

/// Vegas configurable parameters.
#[derive(Debug, Clone)]
pub struct VegasConfig {
    /// Initial congestion window in bytes.
    initial_window: u32,

    /// Minimal congestion window in bytes.
    min_window: u32,

    /// Maximal congestion window in bytes.
    max_window: u32,
}

impl VegasConfig {
    pub fn new(initial_window: u32, min_window: u32, max_window: u32) -> Self {
        Self {
            initial_window,
            min_window,
            max_window,
        }
    }
}

impl Default for VegasConfig {
    fn default() -> Self {
        Self {
            initial_window: crate::INITIAL_CONGESTION_WINDOW,
            min_window: crate::MINIMUM_CONGESTION_WINDOW,
            max_window: crate::MAXIMUM_CONGESTION_WINDOW,
        }
    }
}

impl From<&Config> for VegasConfig {
    fn from(conf: &Config) -> Self {
        Self {
            initial_window: conf.initial_congestion_window,
            min_window: conf.min_congestion_window,
            max_window: conf.max_congestion_window,
        }
    }
}

/// Snapshot of sender state at the moment a probe was issued.
#[derive(Debug, Clone, Copy)]
struct PingSample {
    /// When the probe was sent.
    tv: Instant,

    /// Stream position at send time.
    pos: u32,

    /// Over-buffered backlog estimate at send time.
    extra: u32,

    /// Whether the sender was congestion limited at send time.
    congested: bool,
}

/// Whole milliseconds from `earlier` to `later`, zero if time ran
/// backwards.
fn millis_between(earlier: Instant, later: Instant) -> u64 {
    later.saturating_duration_since(earlier).as_millis() as u64
}

/// Vegas congestion controller.
#[derive(Debug)]
pub struct Vegas {
    /// Config.
    config: VegasConfig,

    /// Statistics.
    stats: CongestionStats,

    /// Monotonic time source.
    clock: Arc<dyn Clock>,

    /// Most recent cumulative byte counter reported by the sender.
    /// Wraps modulo 2^32; all deltas are wrapping subtractions.
    last_position: u32,

    /// Estimated bytes sitting in transport buffers beyond what the
    /// window sustains at the wire latency. Drains at a rate of
    /// `cong_window / base_rtt` bytes per millisecond.
    extra_buffer: u32,

    /// Lowest round trip seen on this stream, in milliseconds. Taken
    /// as the wire latency. Unset until the first pong after a reset.
    base_rtt: Option<u64>,

    /// Congestion window in bytes.
    cong_window: u32,

    /// Pongs received since the last window adjustment.
    measurements: u32,

    /// Minimum buffer-compensated round trip in the current batch.
    min_rtt: Option<u64>,

    /// Same, restricted to probes sent while congestion limited.
    min_congested_rtt: Option<u64>,

    /// When `last_position` and `extra_buffer` were last committed.
    last_update: Instant,

    /// Last time the sender made progress or still had data buffered.
    last_sent: Instant,

    /// When the window was last adjusted or reset.
    last_adjustment: Instant,

    /// When the most recent pong arrived.
    last_pong_arrival: Instant,

    /// The most recently matched pong's probe metadata.
    last_pong: PingSample,

    /// Outstanding probes, oldest first.
    pings: VecDeque<PingSample>,
}

impl Vegas {
    pub fn new(config: VegasConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a controller that reads time from the given clock.
    pub fn with_clock(config: VegasConfig, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let initial_window = config.initial_window.max(config.min_window);

        Self {
            config,
            stats: Default::default(),
            clock,
            last_position: 0,
            extra_buffer: 0,
            base_rtt: None,
            cong_window: initial_window,
            measurements: 0,
            min_rtt: None,
            min_congested_rtt: None,
            last_update: now,
            last_sent: now,
            last_adjustment: now,
            last_pong_arrival: now,
            last_pong: PingSample {
                tv: now,
                pos: 0,
                extra: 0,
                congested: false,
            },
            pings: VecDeque::new(),
        }
    }

    /// Idle threshold: twice the wire latency, floored.
    fn idle_timeout(&self) -> u64 {
        match self.base_rtt {
            Some(base_rtt) => (2 * base_rtt).max(MIN_IDLE_TIMEOUT),
            None => MIN_IDLE_TIMEOUT,
        }
    }

    /// The over-buffered backlog right now, accounting for what the
    /// pipe has drained since the last position update.
    fn extra_buffer_at(&self, now: Instant) -> u32 {
        let base_rtt = match self.base_rtt {
            Some(base_rtt) => base_rtt,
            None => return 0,
        };

        let consumed =
            millis_between(self.last_update, now) * u64::from(self.cong_window) / base_rtt;
        u64::from(self.extra_buffer).saturating_sub(consumed) as u32
    }

    /// Estimate bytes sent but not yet acknowledged at `now`.
    fn in_flight_at(&self, now: Instant) -> u32 {
        // Everything acked?
        if self.last_position == self.last_pong.pos {
            return 0;
        }

        // Before the first round trip the oldest outstanding probe is
        // the only hint about the ack horizon.
        let base_rtt = match self.base_rtt {
            Some(base_rtt) => base_rtt,
            None => {
                return match self.pings.front() {
                    Some(ping) => self.last_position.wrapping_sub(ping.pos),
                    None => 0,
                }
            }
        };

        let window = u64::from(self.cong_window);

        if let Some(next_pong) = self.pings.front() {
            // Project how far the oldest probe's data has come by
            // interpolating between the previous pong and the next
            // one's expected arrival, compensating both endpoints for
            // their own buffer delay.
            let mut eta_next = millis_between(self.last_pong.tv, next_pong.tv);
            eta_next += u64::from(next_pong.extra) * base_rtt / window;
            eta_next =
                eta_next.saturating_sub(u64::from(self.last_pong.extra) * base_rtt / window);

            let elapsed = millis_between(self.last_pong_arrival, now);

            let acked = if eta_next <= elapsed {
                // The pong should be here any moment; assume its data
                // has already arrived.
                next_pong.pos
            } else {
                let span = u64::from(next_pong.pos.wrapping_sub(self.last_pong.pos));
                self.last_pong
                    .pos
                    .wrapping_add((span * elapsed / eta_next) as u32)
            };

            return self.last_position.wrapping_sub(acked);
        }

        // No probes outstanding: every ack we are going to get has
        // arrived, and the backlog drains at the window rate once one
        // wire latency of silence has passed.
        let elapsed = millis_between(self.last_update, now).saturating_sub(base_rtt);
        let drained = (elapsed * window / base_rtt).min(u64::from(self.extra_buffer)) as u32;
        self.extra_buffer - drained
    }

    fn is_congested_at(&self, now: Instant) -> bool {
        self.in_flight_at(now) >= self.cong_window
    }

    /// Milliseconds until `in_flight` would drop below the window,
    /// assuming no further writes.
    fn uncongested_eta_at(&self, now: Instant) -> Option<u64> {
        let window = u64::from(self.cong_window);

        // Below the window already?
        if u64::from(self.last_position.wrapping_sub(self.last_pong.pos)) < window {
            return Some(0);
        }

        let base_rtt = self.base_rtt?;

        let elapsed = millis_between(self.last_pong_arrival, now);
        let mut eta: u64 = 0;
        let mut prev = self.last_pong;
        let mut iter = self.pings.iter();

        // Walk the outstanding probes looking for the one whose pong
        // clears the congested state.
        loop {
            let cur = match iter.next() {
                Some(ping) => *ping,
                // Out of probes; extrapolate one final sample from the
                // current stream state. Its position equals
                // `last_position`, so it always crosses the target.
                None => PingSample {
                    tv: self.last_update,
                    pos: self.last_position,
                    extra: self.extra_buffer,
                    congested: false,
                },
            };

            // Nominal spacing, then each endpoint shifted by its own
            // buffer delay.
            let mut eta_next = millis_between(prev.tv, cur.tv);
            eta_next += u64::from(cur.extra) * base_rtt / window;
            eta_next = eta_next.saturating_sub(u64::from(prev.extra) * base_rtt / window);

            let behind = u64::from(self.last_position.wrapping_sub(cur.pos));
            if behind < window {
                // The target falls inside this interval; take the
                // proportional share.
                let past_target = window - behind;
                let span = u64::from(cur.pos.wrapping_sub(prev.pos));
                eta += eta_next * past_target / span;
                return Some(eta.saturating_sub(elapsed));
            }

            eta += eta_next;
            prev = cur;
        }
    }

    /// Adjust the congestion window from the current measurement batch.
    ///
    /// The goal is a slightly too large window: a perfect one cannot be
    /// told apart from one that is too small, so aim for a few extra
    /// milliseconds of queueing delay.
    fn update_congestion(&mut self, now: Instant) {
        if self.measurements < ADJUSTMENT_SAMPLES {
            return;
        }

        let (base_rtt, min_rtt) = match (self.base_rtt, self.min_rtt) {
            (Some(base_rtt), Some(min_rtt)) => (base_rtt, min_rtt),
            _ => return,
        };

        let window = u64::from(self.cong_window);
        let diff = min_rtt - base_rtt;

        let window = if diff > 100 {
            // Way too fast; scale back to what the wire latency would
            // sustain.
            window * base_rtt / min_rtt
        } else if diff > 50 {
            // Slightly too fast.
            window.saturating_sub(4096)
        } else {
            // Growing the window is only safe when some probe in the
            // batch was sent under actual window pressure; a low RTT
            // from a lightly loaded application proves nothing.
            match self.min_congested_rtt {
                Some(min_congested_rtt) if min_congested_rtt - base_rtt < 5 => {
                    // Way too slow.
                    window + 8192
                }
                Some(min_congested_rtt) if min_congested_rtt - base_rtt < 25 => {
                    // Too slow.
                    window + 4096
                }
                _ => window,
            }
        };

        self.cong_window = window.clamp(
            u64::from(self.config.min_window),
            u64::from(self.config.max_window),
        ) as u32;

        self.measurements = 0;
        self.min_rtt = None;
        self.min_congested_rtt = None;
        self.last_adjustment = now;
        self.stats.window_adjustments = self.stats.window_adjustments.saturating_add(1);

        debug!(
            "{}: rtt {} ms ({} ms base), window {} KiB, {:.3} Mbps",
            self.name(),
            min_rtt,
            base_rtt,
            self.cong_window / 1024,
            f64::from(self.cong_window) * 8.0 / base_rtt as f64 / 1000.0,
        );
    }
}

impl CongestionController for Vegas {
    fn name(&self) -> &str {
        "VEGAS"
    }

    fn update_position(&mut self, pos: u32) {
        let now = self.clock.now();
        let delta = pos.wrapping_sub(self.last_position);

        // Keep the idle detector armed only while the pipe neither
        // received new data nor still holds old data of ours.
        if delta > 0 || self.extra_buffer > 0 {
            self.last_sent = now;
        }

        self.stats.bytes_sent_in_total = self
            .stats
            .bytes_sent_in_total
            .saturating_add(u64::from(delta));

        // A long silence invalidates the queue estimates; shrink back
        // and measure the wire latency anew.
        let idle = millis_between(self.last_sent, now);
        if idle > self.idle_timeout() {
            debug!(
                "{}: idle for {} ms, resetting congestion control",
                self.name(),
                idle
            );

            self.cong_window = self.cong_window.min(self.config.initial_window);
            self.base_rtt = None;
            self.measurements = 0;
            self.min_rtt = None;
            self.min_congested_rtt = None;
            self.last_adjustment = now;
            self.stats.idle_resets = self.stats.idle_resets.saturating_add(1);
        }

        // New bytes nominally join the over-buffer pool while the pipe
        // keeps draining it at the steady-state rate. Possible only
        // once a wire latency measurement exists.
        if let Some(base_rtt) = self.base_rtt {
            let consumed =
                millis_between(self.last_update, now) * u64::from(self.cong_window) / base_rtt;
            self.extra_buffer = (u64::from(self.extra_buffer) + u64::from(delta))
                .saturating_sub(consumed)
                .min(u64::from(u32::MAX)) as u32;
        }

        self.last_position = pos;
        self.last_update = now;
    }

    fn sent_ping(&mut self) {
        let now = self.clock.now();
        let sample = PingSample {
            tv: now,
            pos: self.last_position,
            extra: self.extra_buffer_at(now),
            congested: self.is_congested_at(now),
        };

        self.pings.push_back(sample);
        self.stats.pings_sent_in_total = self.stats.pings_sent_in_total.saturating_add(1);
    }

    fn got_pong(&mut self) {
        let now = self.clock.now();

        // A stray pong, likely from a peer that reset.
        let sample = match self.pings.pop_front() {
            Some(sample) => sample,
            None => {
                self.stats.stray_pongs = self.stats.stray_pongs.saturating_add(1);
                return;
            }
        };

        self.last_pong = sample;
        self.last_pong_arrival = now;
        self.stats.pongs_received_in_total =
            self.stats.pongs_received_in_total.saturating_add(1);

        let mut rtt = millis_between(sample.tv, now).max(1);

        // Track the lowest latency ever seen as the wire latency.
        let base_rtt = match self.base_rtt {
            Some(base_rtt) if base_rtt <= rtt => base_rtt,
            _ => {
                self.base_rtt = Some(rtt);
                rtt
            }
        };

        // Probes sent before the last adjustment do not measure the
        // current window.
        if sample.tv < self.last_adjustment {
            return;
        }

        // Subtract the latency the sender's own backlog added at send
        // time, leaving wire delay plus any foreign queueing.
        let delay = u64::from(sample.extra) * base_rtt / u64::from(self.cong_window);
        rtt = rtt.saturating_sub(delay).max(1);

        // A compensated latency below the wire latency means the
        // backlog estimate was too high; trust the floor instead.
        if rtt < base_rtt {
            rtt = base_rtt;
        }

        // Only minima are kept, which ignores jitter and approves of
        // bursts. Every pong feeds the first minimum: rising delay has
        // to become visible before the application saturates the
        // window. Only pressured probes feed the second one.
        self.min_rtt = Some(self.min_rtt.map_or(rtt, |min_rtt| min_rtt.min(rtt)));
        if sample.congested {
            self.min_congested_rtt = Some(
                self.min_congested_rtt
                    .map_or(rtt, |min_congested_rtt| min_congested_rtt.min(rtt)),
            );
        }

        self.measurements += 1;
        self.update_congestion(now);
    }

    fn is_congested(&self) -> bool {
        self.is_congested_at(self.clock.now())
    }

    fn in_flight(&self) -> u32 {
        self.in_flight_at(self.clock.now())
    }

    fn uncongested_eta(&self) -> Option<Duration> {
        self.uncongested_eta_at(self.clock.now())
            .map(Duration::from_millis)
    }

    fn base_rtt(&self) -> Option<Duration> {
        self.base_rtt.map(Duration::from_millis)
    }

    fn congestion_window(&self) -> u32 {
        self.cong_window
    }

    fn initial_window(&self) -> u32 {
        self.config.initial_window
    }

    fn minimal_window(&self) -> u32 {
        self.config.min_window
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}
