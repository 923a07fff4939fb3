// Copyright 2025 The TreeDb Authors.
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

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::RowTimestamp;

/// Source of the millisecond timestamps stamped on rows.
pub trait StoreClock: Debug + Send + Sync {
    fn now(&self) -> RowTimestamp;
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Debug, Default)]
pub struct SystemClock;

impl StoreClock for SystemClock {
    fn now(&self) -> RowTimestamp {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as RowTimestamp)
            .unwrap_or(0)
    }
}

/// Test clock advanced by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now: RowTimestamp) -> Self {
        ManualClock {
            now: AtomicU64::new(now),
        }
    }

    pub fn set(&self, now: RowTimestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: RowTimestamp) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl StoreClock for ManualClock {
    fn now(&self) -> RowTimestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.now(), 1000);
        clock.advance(50);
        assert_eq!(clock.now(), 1050);
        clock.set(10);
        assert_eq!(clock.now(), 10);
    }

    #[test]
    fn system_clock_is_monotone_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
        assert!(a > 1_600_000_000_000);
    }
}
