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

//! VFlow implements delay-based congestion control for senders running
//! on top of a reliable byte stream, such as a framed update channel
//! over TCP.
//!
//! Buffers along the path will happily absorb an unbounded backlog,
//! inflating round-trip times far beyond the path's propagation delay
//! ("buffer bloat"). VFlow bounds that latency with a TCP Vegas
//! variant: the transport is reliable, so congestion has to be
//! inferred from delay rather than loss.
//!
//! The controller does no I/O. The host feeds it cumulative byte
//! positions and ping/pong probe events, and consults the congestion
//! state before writing:
//!
//! ```
//! use vflow::{build_congestion_controller, Config, CongestionController};
//!
//! let conf = Config::new()?;
//! let mut cc = build_congestion_controller(&conf);
//!
//! cc.update_position(1024);
//! cc.sent_ping();
//! // ... the peer echoes the probe ...
//! cc.got_pong();
//! assert!(!cc.is_congested());
//! # Ok::<(), vflow::error::Error>(())
//! ```

use std::cmp;

/// The initial congestion window in bytes.
///
/// This should get a connection going fairly fast on a decent network.
/// If it is too high it will rapidly be reduced and stay low.
pub const INITIAL_CONGESTION_WINDOW: u32 = 16384;

/// The minimal congestion window in bytes.
///
/// TCP's minimal window is 3*MSS, but the MSS of the underlying stream
/// is unknown here, so guess 4 KiB (it is probably a bit higher).
pub const MINIMUM_CONGESTION_WINDOW: u32 = 4096;

/// The maximal congestion window in bytes (4 MiB, the current default
/// maximum socket buffer size on Linux).
pub const MAXIMUM_CONGESTION_WINDOW: u32 = 4194304;

/// Result type for vflow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations about the congestion controller.
#[derive(Debug, Clone)]
pub struct Config {
    /// The congestion control algorithm used for a stream.
    pub(crate) congestion_control_algorithm: CongestionControlAlgorithm,

    /// The initial congestion window in bytes.
    pub(crate) initial_congestion_window: u32,

    /// The minimal congestion window in bytes.
    pub(crate) min_congestion_window: u32,

    /// The maximal congestion window in bytes.
    pub(crate) max_congestion_window: u32,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set
    /// methods.
    pub fn new() -> Result<Self> {
        Ok(Self {
            congestion_control_algorithm: CongestionControlAlgorithm::Vegas,
            initial_congestion_window: INITIAL_CONGESTION_WINDOW,
            min_congestion_window: MINIMUM_CONGESTION_WINDOW,
            max_congestion_window: MAXIMUM_CONGESTION_WINDOW,
        })
    }

    /// Set congestion control algorithm that the stream would use.
    /// The default value is Vegas.
    pub fn set_congestion_control_algorithm(&mut self, cca: CongestionControlAlgorithm) {
        self.congestion_control_algorithm = cca;
    }

    /// Set the initial congestion window in bytes.
    /// The value is capped by the configured window bounds.
    /// The default value is `16384`.
    pub fn set_initial_congestion_window(&mut self, v: u32) {
        self.initial_congestion_window =
            v.clamp(self.min_congestion_window, self.max_congestion_window);
    }

    /// Set the minimal congestion window in bytes.
    /// The value is capped by the setting `max_congestion_window`.
    /// The default value is `4096`.
    pub fn set_min_congestion_window(&mut self, v: u32) {
        self.min_congestion_window = cmp::min(v.max(1), self.max_congestion_window);
    }

    /// Set the maximal congestion window in bytes.
    /// The value is floored by the setting `min_congestion_window`.
    /// The default value is `4194304`.
    pub fn set_max_congestion_window(&mut self, v: u32) {
        self.max_congestion_window = cmp::max(v, self.min_congestion_window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let conf = Config::new().unwrap();
        assert_eq!(
            conf.congestion_control_algorithm,
            CongestionControlAlgorithm::Vegas
        );
        assert_eq!(conf.initial_congestion_window, INITIAL_CONGESTION_WINDOW);
        assert_eq!(conf.min_congestion_window, MINIMUM_CONGESTION_WINDOW);
        assert_eq!(conf.max_congestion_window, MAXIMUM_CONGESTION_WINDOW);
    }

    #[test]
    fn config_window_capping() {
        let mut conf = Config::new().unwrap();

        conf.set_min_congestion_window(8 * 1024 * 1024);
        assert_eq!(conf.min_congestion_window, MAXIMUM_CONGESTION_WINDOW);

        conf.set_initial_congestion_window(1);
        assert_eq!(conf.initial_congestion_window, conf.min_congestion_window);

        let mut conf = Config::new().unwrap();
        conf.set_max_congestion_window(1);
        assert_eq!(conf.max_congestion_window, conf.min_congestion_window);
    }
}

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

pub mod clock;
pub mod error;

pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::CongestionControlAlgorithm;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionStats;
pub use crate::error::Error;
