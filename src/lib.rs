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

//! Logroll is a concurrency-safe, buffered log file sink with automatic
//! rotation and background archiving.
//!
//! # Overview
//!
//! A [`RollingWriter`] appends caller-formatted byte records to a single
//! actively written "hot" file. Driven by size, fixed-interval, and
//! midnight policies (or a manual [`RollingWriter::rotate`] call), the hot
//! file is closed, renamed, and relocated into an archive directory as an
//! immutable, timestamped "cold" file, while writes continue against a
//! fresh hot file. The rename happens in place and up front; the slower
//! cross-directory move runs on a background thread so it never blocks a
//! writer.
//!
//! The writer implements [`std::io::Write`] (for both `RollingWriter` and
//! `&RollingWriter`), so it slots in behind any logging front end that
//! emits bytes. Records are opaque: nothing here parses, filters, or
//! reformats them.
//!
//! # Examples
//!
//! ```no_run
//! use std::io::Write;
//! use std::time::Duration;
//!
//! use logroll::Config;
//! use logroll::RollingWriterBuilder;
//!
//! let writer = RollingWriterBuilder::new("mywebserver")
//!     .config(Config {
//!         buffer_capacity: 64 * 1024,
//!         flush_interval: Duration::from_secs(1),
//!         max_hot_size: 100 * 1024 * 1024,
//!         rotate_at_midnight: true,
//!         hot_path: "/var/log/mywebserver".into(),
//!         cold_path: "/var/log/mywebserver/arch".into(),
//!         ..Config::default()
//!     })
//!     .rotate_existing_on_start(true)
//!     .error_sink(|err: &anyhow::Error| eprintln!("logroll: {err:#}"))
//!     .build()
//!     .unwrap();
//!
//! (&writer).write_all(b"listening on :8080\n").unwrap();
//! writer.close().unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod archive;
mod buffer;
mod clock;
mod config;
mod error;
mod naming;
mod policy;
mod rolling;
mod timer;

pub use config::Config;
pub use config::RunningMode;
pub use error::ErrorSink;
pub use naming::ColdNameFormatter;
pub use naming::default_cold_name;
pub use rolling::RollingWriter;
pub use rolling::RollingWriterBuilder;
