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

//! Monotonic time sources.
//!
//! All time-based logic in the controllers is driven by `Instant`
//! readings taken through a [`Clock`], so tests can substitute a
//! deterministic source and steps of the wall clock can never corrupt
//! controller state.

use std::fmt;
use std::time::Instant;

/// A monotonic source of `Instant` readings.
pub trait Clock: fmt::Debug + Send + Sync {
    /// Return the current instant.
    fn now(&self) -> Instant;
}

/// The default clock, backed by `Instant::now()`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// A manually advanced clock for deterministic tests.
    #[derive(Debug)]
    pub(crate) struct MockClock {
        start: Instant,
        elapsed_ms: AtomicU64,
    }

    impl MockClock {
        pub(crate) fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed_ms: AtomicU64::new(0),
            }
        }

        /// Advance the clock by `ms` milliseconds.
        pub(crate) fn advance(&self, ms: u64) {
            self.elapsed_ms.fetch_add(ms, Ordering::SeqCst);
        }
    }

    impl Clock for MockClock {
        fn now(&self) -> Instant {
            self.start + Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
        }
    }
}
