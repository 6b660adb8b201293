use crate::fifo::Shared;
use crate::stats::Statistics;
use std::ops::Deref;
use std::slice;
use std::sync::Arc;

/// Consumer half of a [`RingFifo`](crate::RingFifo).
///
/// Owned by exactly one thread. Mirror image of [`Drain`](crate::Drain):
/// reserve a window with [`request_read`](Self::request_read), consume it in
/// place, then release it with [`ReadReservation::commit`].
pub struct Source {
    shared: Arc<Shared>,
}

impl Source {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Reserves up to `max_len` contiguous committed bytes for reading,
    /// without copying.
    ///
    /// Blocks while the ring is empty; once blocked, it stays blocked until
    /// the fill level has reached the high watermark (or the stream ended).
    /// Published data is checked before the end-of-stream flag, so bytes
    /// already in the ring are always delivered even after the producer
    /// finished.
    ///
    /// Returns `None` once the stream has ended and the ring is drained.
    ///
    /// # Panics
    ///
    /// Panics if `max_len` is zero.
    pub fn request_read(&mut self, max_len: usize) -> Option<ReadReservation<'_>> {
        assert!(max_len > 0, "cannot request a zero-length read window");

        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            if state.level > 0 {
                let contiguous = shared.capacity - state.read_pos;
                let len = max_len.min(state.level).min(contiguous);
                state.read_reserved = len;
                return Some(ReadReservation {
                    shared,
                    offset: state.read_pos,
                    len,
                    committed: false,
                });
            }
            if state.eos {
                return None;
            }
            shared.stats.note_empty();
            shared.source_cv.wait(&mut state);
        }
    }

    /// Declares that the output stream is no longer read.
    ///
    /// Bytes left in the ring are discarded; the producer observes the end
    /// of stream on its next request and stops. Wakes the producer
    /// unconditionally (ignoring the low watermark).
    pub fn end_read(&mut self) {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        state.eos = true;
        state.read_reserved = 0;
        shared.drain_cv.notify_all();
    }

    /// Copying convenience: fills `dst` through the reservation protocol.
    ///
    /// Returns the number of bytes delivered, which equals `dst.len()`
    /// except when the end of the stream was reached first. Only for
    /// callers that cannot use the zero-copy path.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mut filled = 0;
        while filled < dst.len() {
            let Some(reservation) = self.request_read(dst.len() - filled) else {
                break;
            };
            let len = reservation.len();
            dst[filled..filled + len].copy_from_slice(&reservation);
            reservation.commit();
            filled += len;
        }
        filled
    }

    /// Handle to the ring's wait counters.
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.shared.stats)
    }
}

impl std::fmt::Debug for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Source").finish_non_exhaustive()
    }
}

/// A reserved, readable window into the ring.
///
/// Derefs to `&[u8]` over exactly the reserved bytes. Release with
/// [`commit`](Self::commit) or [`commit_n`](Self::commit_n) (a short commit
/// keeps the tail of the window unconsumed). Dropping without committing
/// cancels the reservation and consumes nothing.
pub struct ReadReservation<'a> {
    shared: &'a Shared,
    offset: usize,
    len: usize,
    committed: bool,
}

impl ReadReservation<'_> {
    /// Number of reserved bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Releases the whole window.
    pub fn commit(self) {
        let len = self.len;
        self.commit_n(len);
    }

    /// Releases the first `n` bytes of the window.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the reservation.
    pub fn commit_n(mut self, n: usize) {
        assert!(
            n <= self.len,
            "cannot commit {n} bytes of a {} byte reservation",
            self.len
        );
        self.release(n);
    }

    fn release(&mut self, n: usize) {
        self.committed = true;

        let shared = self.shared;
        let mut state = shared.state.lock();
        debug_assert_eq!(state.read_reserved, self.len, "reservation size drifted");
        state.read_reserved = 0;
        state.read_pos += n;
        if state.read_pos == shared.capacity {
            state.read_pos = 0;
        }
        debug_assert!(state.level >= n, "consuming more than committed");
        state.level -= n;

        if state.level <= shared.low_watermark {
            shared.drain_cv.notify_all();
        }
    }
}

impl Deref for ReadReservation<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        // SAFETY: [offset, offset + len) is covered by the outstanding read
        // reservation; the bytes were published by a write commit and the
        // producer cannot reuse them until this window is released.
        unsafe { slice::from_raw_parts(self.shared.buf_ptr().add(self.offset), self.len) }
    }
}

impl Drop for ReadReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.shared.state.lock();
            state.read_reserved = 0;
        }
    }
}
