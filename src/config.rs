// Copyright 2024 FastLabs Developers
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

use std::path::PathBuf;
use std::time::Duration;

/// Where written records end up besides the hot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    /// Write to the hot file only.
    FileOnly,
    /// Write to the hot file and mirror every record to stdout.
    FileAndStdout,
}

/// Runtime parameters of a [`RollingWriter`](crate::RollingWriter).
///
/// A `Config` is a plain value object: it can be swapped wholesale at
/// runtime with [`RollingWriter::set_config`](crate::RollingWriter::set_config).
///
/// Zero disables: a zero `buffer_capacity` writes through unbuffered, a zero
/// `flush_interval` disables timer-driven flushes, a zero `max_hot_size` or
/// `rotate_interval` disables the corresponding rotation trigger.
#[derive(Debug, Clone)]
pub struct Config {
    /// Output mode; see [`RunningMode`].
    pub mode: RunningMode,
    /// Write buffer capacity in bytes. 0 disables buffering.
    pub buffer_capacity: usize,
    /// How often the background timer flushes the buffer. Zero disables.
    pub flush_interval: Duration,
    /// Rotate once the hot file grows past this many bytes. 0 disables.
    pub max_hot_size: u64,
    /// Rotate every fixed interval. Zero disables.
    pub rotate_interval: Duration,
    /// Rotate when the local calendar day changes.
    pub rotate_at_midnight: bool,
    /// Directory holding the actively written hot file.
    pub hot_path: PathBuf,
    /// Directory rotated cold files are moved into.
    pub cold_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: RunningMode::FileOnly,
            buffer_capacity: 0,
            flush_interval: Duration::ZERO,
            max_hot_size: 0,
            rotate_interval: Duration::ZERO,
            rotate_at_midnight: false,
            hot_path: PathBuf::from("."),
            cold_path: PathBuf::from("."),
        }
    }
}

impl Config {
    pub(crate) fn wants_timer(&self) -> bool {
        !self.flush_interval.is_zero() || !self.rotate_interval.is_zero() || self.rotate_at_midnight
    }
}
