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

use std::fs;
use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;

use crate::error::SharedErrorSink;
use crate::error::dispatch;

/// One staged hot file waiting to be moved into the archive directory.
#[derive(Debug)]
pub(crate) struct MoveJob {
    pub(crate) src: PathBuf,
    pub(crate) dst: PathBuf,
}

/// Spawn the mover thread.
///
/// Rotation stages the closed hot file under a temporary name in the hot
/// directory (fast, same filesystem) and enqueues the final cross-directory
/// move here so the writer lock is never held across it. The thread drains
/// jobs until every sender is dropped, which is how `close()` waits for
/// in-flight moves.
///
/// A failed move is delivered to the error sink and the job is dropped; the
/// staged file keeps the rotated bytes, so nothing is lost.
pub(crate) fn spawn_mover(
    id: &str,
    receiver: Receiver<MoveJob>,
    error_sink: SharedErrorSink,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("logroll-archive-{id}"))
        .spawn(move || {
            while let Ok(job) = receiver.recv() {
                if let Err(err) = fs::rename(&job.src, &job.dst) {
                    let err = anyhow::Error::new(err).context(format!(
                        "failed to archive {} to {}",
                        job.src.display(),
                        job.dst.display()
                    ));
                    dispatch(&error_sink, &err);
                }
            }
        })
        .expect("failed to spawn the logroll archive mover thread")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use crossbeam_channel::unbounded;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_mover_relocates_staged_files() {
        let hot_dir = TempDir::new().unwrap();
        let cold_dir = TempDir::new().unwrap();

        let src = hot_dir.path().join("app-20240810-171252.log.tmp");
        let dst = cold_dir.path().join("app-20240810-171252.log");
        fs::write(&src, b"rotated bytes").unwrap();

        let (tx, rx) = unbounded();
        let handle = spawn_mover("test", rx, Arc::new(Mutex::new(None)));

        tx.send(MoveJob {
            src: src.clone(),
            dst: dst.clone(),
        })
        .unwrap();
        drop(tx);
        handle.join().unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).unwrap(), b"rotated bytes");
    }

    #[test]
    fn test_failed_move_reaches_the_error_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = seen.clone();
        let sink: Box<dyn crate::ErrorSink> = Box::new(move |err: &anyhow::Error| {
            sink_seen.lock().unwrap().push(format!("{err}"));
        });
        let error_sink: SharedErrorSink = Arc::new(Mutex::new(Some(sink)));

        let (tx, rx) = unbounded();
        let handle = spawn_mover("test", rx, error_sink);

        tx.send(MoveJob {
            src: PathBuf::from("/nonexistent/never.log.tmp"),
            dst: PathBuf::from("/nonexistent/never.log"),
        })
        .unwrap();
        drop(tx);
        handle.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("failed to archive"));
    }
}
