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

use std::collections::VecDeque;
use std::time::Duration;

use super::CongestionController;
use super::CongestionStats;

/// Fixed is a simple congestion controller with a static congestion
/// window. It never reacts to latency; only naive FIFO probe
/// accounting is kept so that `in_flight` stays meaningful. It is
/// intended to be used for testing and experiments.
#[derive(Debug)]
pub struct Fixed {
    /// Congestion window in bytes.
    cwnd: u32,

    /// Most recent cumulative byte counter reported by the sender.
    last_position: u32,

    /// Position confirmed by the most recent pong.
    acked_position: u32,

    /// Positions of outstanding probes, oldest first.
    pings: VecDeque<u32>,

    /// Congestion statistics.
    stats: CongestionStats,
}

impl Fixed {
    pub fn new(cwnd: u32) -> Self {
        Self {
            cwnd,
            last_position: 0,
            acked_position: 0,
            pings: VecDeque::new(),
            stats: Default::default(),
        }
    }
}

impl CongestionController for Fixed {
    fn name(&self) -> &str {
        "FIXED"
    }

    fn update_position(&mut self, pos: u32) {
        let delta = pos.wrapping_sub(self.last_position);
        self.last_position = pos;
        self.stats.bytes_sent_in_total = self
            .stats
            .bytes_sent_in_total
            .saturating_add(u64::from(delta));
    }

    fn sent_ping(&mut self) {
        self.pings.push_back(self.last_position);
        self.stats.pings_sent_in_total = self.stats.pings_sent_in_total.saturating_add(1);
    }

    fn got_pong(&mut self) {
        match self.pings.pop_front() {
            Some(pos) => {
                self.acked_position = pos;
                self.stats.pongs_received_in_total =
                    self.stats.pongs_received_in_total.saturating_add(1);
            }
            None => self.stats.stray_pongs = self.stats.stray_pongs.saturating_add(1),
        }
    }

    fn is_congested(&self) -> bool {
        self.in_flight() >= self.cwnd
    }

    fn in_flight(&self) -> u32 {
        self.last_position.wrapping_sub(self.acked_position)
    }

    fn uncongested_eta(&self) -> Option<Duration> {
        if self.is_congested() {
            None
        } else {
            Some(Duration::ZERO)
        }
    }

    fn base_rtt(&self) -> Option<Duration> {
        None
    }

    fn congestion_window(&self) -> u32 {
        self.cwnd
    }

    fn initial_window(&self) -> u32 {
        self.cwnd
    }

    fn minimal_window(&self) -> u32 {
        self.cwnd
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_init() {
        let f = Fixed::new(16384);
        assert_eq!(f.name(), "FIXED");
        assert_eq!(f.congestion_window(), 16384);
        assert_eq!(f.initial_window(), 16384);
        assert_eq!(f.minimal_window(), 16384);
        assert_eq!(f.base_rtt(), None);
        assert_eq!(f.in_flight(), 0);
        assert!(!f.is_congested());
    }

    #[test]
    fn fixed_probe_accounting() {
        let mut f = Fixed::new(16384);

        f.update_position(10_000);
        f.sent_ping();
        f.update_position(30_000);
        assert_eq!(f.in_flight(), 30_000);
        assert!(f.is_congested());
        assert_eq!(f.uncongested_eta(), None);

        f.got_pong();
        assert_eq!(f.in_flight(), 20_000);
        assert!(f.is_congested());

        f.sent_ping();
        f.got_pong();
        assert_eq!(f.in_flight(), 0);
        assert!(!f.is_congested());
        assert_eq!(f.uncongested_eta(), Some(Duration::ZERO));

        f.got_pong();
        assert_eq!(f.stats().stray_pongs, 1);
        assert_eq!(f.stats().pongs_received_in_total, 2);
        assert_eq!(f.stats().bytes_sent_in_total, 30_000);
    }
}
