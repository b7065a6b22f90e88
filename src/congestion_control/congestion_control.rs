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

use core::str::FromStr;
use std::fmt;
use std::time::Duration;

use strum_macros::EnumIter;

use crate::Config;
use crate::Error;
use crate::Result;
pub use fixed::Fixed;
pub use vegas::Vegas;
pub use vegas::VegasConfig;

/// Available congestion control algorithms.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Default, EnumIter)]
pub enum CongestionControlAlgorithm {
    /// Vegas is a delay based algorithm adapted for senders running on
    /// top of a reliable transport. Loss never happens there, so the
    /// only symptom of an oversized window is latency added by
    /// intermediate buffers; Vegas bounds that self-induced delay by
    /// comparing round-trip probes against the lowest latency ever
    /// seen and sizing the congestion window accordingly.
    #[default]
    Vegas,

    /// Fixed is a simple congestion controller with a static congestion
    /// window. It is intended to be used for testing and experiments.
    Fixed,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = Error;

    fn from_str(algor: &str) -> Result<CongestionControlAlgorithm> {
        if algor.eq_ignore_ascii_case("vegas") {
            Ok(CongestionControlAlgorithm::Vegas)
        } else if algor.eq_ignore_ascii_case("fixed") {
            Ok(CongestionControlAlgorithm::Fixed)
        } else {
            Err(Error::InvalidConfig("unknown".into()))
        }
    }
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone)]
pub struct CongestionStats {
    /// Total bytes the sender pushed into the transport.
    pub bytes_sent_in_total: u64,

    /// Total probe markers recorded.
    pub pings_sent_in_total: u64,

    /// Total pongs matched against an outstanding probe.
    pub pongs_received_in_total: u64,

    /// Pongs that arrived with no outstanding probe.
    pub stray_pongs: u64,

    /// Times the controller reset after an idle period.
    pub idle_resets: u64,

    /// Congestion window adjustments performed.
    pub window_adjustments: u64,
}

/// Congestion control interfaces shared by different algorithms.
///
/// A controller performs no I/O of its own. The owning transport
/// reports write progress through [`update_position`] and probe round
/// trips through [`sent_ping`]/[`got_pong`], and consults
/// [`is_congested`] and [`uncongested_eta`] before writing more data.
/// All operations must be called from the transport's own serialized
/// context; none of them suspends or blocks.
///
/// [`update_position`]: CongestionController::update_position
/// [`sent_ping`]: CongestionController::sent_ping
/// [`got_pong`]: CongestionController::got_pong
/// [`is_congested`]: CongestionController::is_congested
/// [`uncongested_eta`]: CongestionController::uncongested_eta
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback after the sender pushed data. `pos` is the cumulative
    /// byte counter of the outgoing stream, wrapping modulo 2^32. May
    /// also be called with an unchanged position to report "no
    /// progress".
    fn update_position(&mut self, pos: u32);

    /// Callback after a probe marker was placed on the outgoing stream.
    fn sent_ping(&mut self);

    /// Callback when the response to the oldest outstanding probe
    /// marker arrives. A pong with no outstanding probe is ignored.
    fn got_pong(&mut self);

    /// Check if the stream currently carries at least a full congestion
    /// window of unacknowledged data.
    fn is_congested(&self) -> bool;

    /// Estimated bytes sent but not yet acknowledged.
    fn in_flight(&self) -> u32;

    /// Estimated wait until [`in_flight`] drops below the congestion
    /// window, assuming no further writes. Zero when uncongested;
    /// `None` until a first round-trip measurement exists.
    ///
    /// [`in_flight`]: CongestionController::in_flight
    fn uncongested_eta(&self) -> Option<Duration>;

    /// The lowest round-trip time seen on this stream, if any pong has
    /// been received since the last idle reset.
    fn base_rtt(&self) -> Option<Duration>;

    /// Current congestion window in bytes.
    fn congestion_window(&self) -> u32;

    /// Initial congestion window in bytes.
    fn initial_window(&self) -> u32;

    /// Minimal congestion window in bytes.
    fn minimal_window(&self) -> u32;

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller.")
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &Config) -> Box<dyn CongestionController> {
    match conf.congestion_control_algorithm {
        CongestionControlAlgorithm::Vegas => Box::new(Vegas::new(VegasConfig::from(conf))),
        CongestionControlAlgorithm::Fixed => Box::new(Fixed::new(conf.initial_congestion_window)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn congestion_control_name() {
        let cases = [
            ("vegas", Ok(CongestionControlAlgorithm::Vegas)),
            ("Vegas", Ok(CongestionControlAlgorithm::Vegas)),
            ("VEGAS", Ok(CongestionControlAlgorithm::Vegas)),
            ("fixed", Ok(CongestionControlAlgorithm::Fixed)),
            ("Fixed", Ok(CongestionControlAlgorithm::Fixed)),
            ("FIXED", Ok(CongestionControlAlgorithm::Fixed)),
            ("vegsa", Err(Error::InvalidConfig("unknown".into()))),
        ];

        for (name, algor) in cases {
            assert_eq!(CongestionControlAlgorithm::from_str(name), algor);
        }
    }

    #[test]
    fn congestion_control_build_congestion_controller() -> Result<()> {
        let mut config = Config::new()?;

        let cc = build_congestion_controller(&config);
        assert_eq!(cc.name(), "VEGAS");
        assert_eq!(cc.initial_window(), config.initial_congestion_window);
        assert_eq!(cc.minimal_window(), config.min_congestion_window);
        assert_eq!(
            cc.congestion_window(),
            cc.minimal_window().max(cc.initial_window())
        );
        assert_eq!(cc.base_rtt(), None);
        assert_eq!(format!("{:?}", cc), "congestion controller.");

        config.set_congestion_control_algorithm(CongestionControlAlgorithm::Fixed);
        let cc = build_congestion_controller(&config);
        assert_eq!(cc.name(), "FIXED");

        Ok(())
    }

    #[test]
    fn congestion_control_fresh_controllers_are_uncongested() {
        let mut config = Config::new().unwrap();

        for algor in CongestionControlAlgorithm::iter() {
            config.set_congestion_control_algorithm(algor);
            let mut cc = build_congestion_controller(&config);

            cc.update_position(0);
            assert_eq!(cc.in_flight(), 0);
            assert!(!cc.is_congested());
        }
    }
}

mod fixed;
mod vegas;
