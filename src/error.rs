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
use std::sync::PoisonError;

/// A destination for errors that occur off the caller's control flow.
///
/// The archival move and timer-driven flush/rotate run on background
/// threads; their failures cannot be returned to any caller, so they are
/// delivered here instead. If no sink is installed such errors are
/// silently discarded.
///
/// Closures work directly:
///
/// ```
/// # use logroll::RollingWriterBuilder;
/// let builder = RollingWriterBuilder::new("app")
///     .error_sink(|err: &anyhow::Error| eprintln!("logroll: {err:#}"));
/// ```
pub trait ErrorSink: Send + Sync {
    /// Receive one error. Called synchronously on the failing thread.
    fn sink(&self, err: &anyhow::Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&anyhow::Error) + Send + Sync,
{
    fn sink(&self, err: &anyhow::Error) {
        self(err)
    }
}

/// The sink slot shared between the writer core and its worker threads.
pub(crate) type SharedErrorSink = Arc<Mutex<Option<Box<dyn ErrorSink>>>>;

pub(crate) fn dispatch(sink: &SharedErrorSink, err: &anyhow::Error) {
    let guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(sink) = guard.as_ref() {
        sink.sink(err);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[test]
    fn test_dispatch_counts_and_ignores_unset() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink: SharedErrorSink = Arc::new(Mutex::new(None));

        // unset: nothing happens
        dispatch(&sink, &anyhow::anyhow!("dropped"));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        let seen = count.clone();
        *sink.lock().unwrap() = Some(Box::new(move |_: &anyhow::Error| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        dispatch(&sink, &anyhow::anyhow!("delivered"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
