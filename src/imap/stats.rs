//-
// Copyright (c) 2026, the Postern developers
//
// This file is part of Postern.
//
// Postern is free software: you can  redistribute it and/or modify it under the
// terms of  the GNU General Public  License as published by  the Free Software
// Foundation, either version  3 of the License, or (at  your option) any later
// version.
//
// Postern is distributed  in the hope that  it will be useful,  but WITHOUT ANY
// WARRANTY; without  even the implied  warranty of MERCHANTABILITY  or FITNESS
// FOR  A PARTICULAR  PURPOSE.  See the  GNU General  Public  License for  more
// details.
//
// You should have received a copy of the GNU General Public License along with
// Postern. If not, see <http://www.gnu.org/licenses/>.

//! Per-command latency statistics.

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::debug;

/// Receives one latency sample per dispatched command.
///
/// Implementations are shared by every connection and must tolerate
/// concurrent use.
pub trait Stats: Send + Sync {
    fn record_latency(&self, command: &str, elapsed: Duration);
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullStats;

impl Stats for NullStats {
    fn record_latency(&self, _: &str, _: Duration) {}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Tracker {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl Tracker {
    pub fn average(&self) -> Duration {
        let nanos = self.total.as_nanos() / u128::from(self.count.max(1));
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

/// Aggregates latency per command name in memory.
#[derive(Debug, Default)]
pub struct CommandStats {
    trackers: Mutex<BTreeMap<String, Tracker>>,
}

impl CommandStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Tracker> {
        match self.trackers.lock() {
            Ok(trackers) => trackers.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn log_summary(&self) {
        for (command, tracker) in self.snapshot() {
            debug!(
                "stats: {} count={} avg={:?} max={:?}",
                command,
                tracker.count,
                tracker.average(),
                tracker.max,
            );
        }
    }
}

impl Stats for CommandStats {
    fn record_latency(&self, command: &str, elapsed: Duration) {
        let mut trackers = match self.trackers.lock() {
            Ok(trackers) => trackers,
            Err(poisoned) => poisoned.into_inner(),
        };
        let tracker = trackers.entry(command.to_owned()).or_default();
        tracker.count += 1;
        tracker.total += elapsed;
        tracker.max = tracker.max.max(elapsed);
    }
}

/// Times one dispatch cycle, recording the sample when dropped.
///
/// Because recording happens in `Drop`, the sample is taken on every exit
/// path out of the dispatcher, including unwinding. Nothing is recorded if
/// the cycle was never attributed to a command.
pub struct CommandTimer<'a> {
    stats: &'a dyn Stats,
    start: Instant,
    command: Option<&'static str>,
}

impl<'a> CommandTimer<'a> {
    pub fn start(stats: &'a dyn Stats) -> Self {
        CommandTimer {
            stats,
            start: Instant::now(),
            command: None,
        }
    }

    /// Only names from the command table may be used, since every distinct
    /// name gets its own entry in the shared statistics.
    pub fn attribute(&mut self, command: &'static str) {
        self.command = Some(command);
    }
}

impl Drop for CommandTimer<'_> {
    fn drop(&mut self) {
        if let Some(command) = self.command.take() {
            self.stats.record_latency(command, self.start.elapsed());
        }
    }
}
