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

/// Fixed-capacity write buffer.
///
/// Payloads are copied in whole or not at all; the caller decides what to do
/// with a payload that does not fit. The backing allocation is made once at
/// construction and never resized.
#[derive(Debug, Default)]
pub(crate) struct RecordBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl RecordBuffer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            filled: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.filled == 0
    }

    pub(crate) fn fits(&self, len: usize) -> bool {
        len <= self.capacity() - self.filled
    }

    /// Copy `bytes` after the already-buffered content. Caller must have
    /// checked [`fits`](Self::fits).
    pub(crate) fn fill(&mut self, bytes: &[u8]) {
        debug_assert!(self.fits(bytes.len()));
        self.data[self.filled..self.filled + bytes.len()].copy_from_slice(bytes);
        self.filled += bytes.len();
    }

    pub(crate) fn pending(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    pub(crate) fn clear(&mut self) {
        self.filled = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_drain() {
        let mut buf = RecordBuffer::with_capacity(16);
        assert!(buf.is_empty());
        assert!(buf.fits(16));
        assert!(!buf.fits(17));

        buf.fill(b"0123456789");
        assert_eq!(buf.pending(), b"0123456789");
        assert!(buf.fits(6));
        assert!(!buf.fits(7));

        buf.fill(b"abcdef");
        assert_eq!(buf.pending(), b"0123456789abcdef");

        buf.clear();
        assert!(buf.is_empty());
        assert!(buf.fits(16));
    }

    #[test]
    fn test_zero_capacity_never_fits() {
        let buf = RecordBuffer::with_capacity(0);
        assert_eq!(buf.capacity(), 0);
        assert!(buf.fits(0));
        assert!(!buf.fits(1));
    }
}
