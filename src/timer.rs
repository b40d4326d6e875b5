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

use std::sync::Arc;
use std::sync::Mutex;
use std::thread::JoinHandle;

use crossbeam_channel::RecvTimeoutError;
use crossbeam_channel::Sender;
use crossbeam_channel::bounded;

use crate::rolling::Core;
use crate::rolling::lock_core;

/// The background task driving timer-based flushes and rotations.
///
/// Between ticks it sleeps on the stop channel; each tick takes the same
/// core lock external callers use, so timer-driven work is serialized with
/// writes exactly like another caller. [`stop`](Self::stop) signals the
/// thread and joins it, guaranteeing no tick is in flight afterwards.
pub(crate) struct TimerHandle {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl TimerHandle {
    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.join();
    }
}

pub(crate) fn spawn_timer(id: &str, core: Arc<Mutex<Core>>) -> TimerHandle {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let handle = std::thread::Builder::new()
        .name(format!("logroll-timer-{id}"))
        .spawn(move || {
            loop {
                let timeout = lock_core(&core).next_timer_timeout();
                match timeout {
                    // nothing scheduled; sleep until stopped
                    None => {
                        let _ = stop_rx.recv();
                        break;
                    }
                    Some(timeout) => match stop_rx.recv_timeout(timeout) {
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                        Err(RecvTimeoutError::Timeout) => lock_core(&core).on_timer_tick(),
                    },
                }
            }
        })
        .expect("failed to spawn the logroll timer thread");

    TimerHandle {
        stop: stop_tx,
        handle,
    }
}
