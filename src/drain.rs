use crate::fifo::Shared;
use crate::stats::Statistics;
use std::ops::{Deref, DerefMut};
use std::slice;
use std::sync::Arc;

/// Producer half of a [`RingFifo`](crate::RingFifo).
///
/// Owned by exactly one thread. Writing is a two-step protocol: reserve a
/// contiguous window with [`request_write`](Self::request_write), fill it in
/// place, then publish it with [`WriteReservation::commit`]. The borrow rules
/// make a second reservation impossible while one is outstanding, and a
/// commit can only ever refer to the window that was handed out.
pub struct Drain {
    shared: Arc<Shared>,
}

impl Drain {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Reserves up to `max_len` contiguous bytes for writing, without
    /// copying.
    ///
    /// Blocks while the ring is full; once blocked, it stays blocked until
    /// the fill level has dropped to the low watermark (or the stream
    /// ended). The returned window may be shorter than `max_len`: it is
    /// capped by the free space and never wraps the ring end.
    ///
    /// Returns `None` when the consumer has quit; the producer must stop.
    /// End of stream is checked before free space, so a quit consumer stops
    /// the producer even when room remains.
    ///
    /// # Panics
    ///
    /// Panics if `max_len` is zero.
    pub fn request_write(&mut self, max_len: usize) -> Option<WriteReservation<'_>> {
        assert!(max_len > 0, "cannot request a zero-length write window");

        let shared = &*self.shared;
        let mut state = shared.state.lock();
        loop {
            if state.eos {
                return None;
            }
            if state.level < shared.capacity {
                let free = shared.capacity - state.level;
                let contiguous = shared.capacity - state.write_pos;
                let len = max_len.min(free).min(contiguous);
                state.write_reserved = len;
                return Some(WriteReservation {
                    shared,
                    offset: state.write_pos,
                    len,
                    committed: false,
                });
            }
            shared.stats.note_full();
            shared.drain_cv.wait(&mut state);
        }
    }

    /// Declares the end of the input stream.
    ///
    /// Wakes the consumer unconditionally (ignoring the high watermark) so
    /// it can drain the remaining bytes and observe the end of stream.
    pub fn end_write(&mut self) {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        state.eos = true;
        state.write_reserved = 0;
        shared.source_cv.notify_all();
    }

    /// Copying convenience: writes all of `src` through the reservation
    /// protocol.
    ///
    /// Returns the number of bytes NOT written, which is zero unless the
    /// consumer quit mid-stream. Only for callers that cannot use the
    /// zero-copy path; the data crosses the memory bus twice.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let mut written = 0;
        while written < src.len() {
            let Some(mut reservation) = self.request_write(src.len() - written) else {
                return src.len() - written;
            };
            let len = reservation.len();
            reservation.copy_from_slice(&src[written..written + len]);
            reservation.commit();
            written += len;
        }
        0
    }

    /// Handle to the ring's wait counters.
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.shared.stats)
    }
}

impl std::fmt::Debug for Drain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drain").finish_non_exhaustive()
    }
}

/// A reserved, writable window into the ring.
///
/// Derefs to `&mut [u8]` over exactly the reserved bytes. Publish with
/// [`commit`](Self::commit) (the whole window) or [`commit_n`](Self::commit_n)
/// (a prefix — a short commit simply shrinks the published region). Dropping
/// the reservation without committing cancels it and publishes nothing.
pub struct WriteReservation<'a> {
    shared: &'a Shared,
    offset: usize,
    len: usize,
    committed: bool,
}

impl WriteReservation<'_> {
    /// Number of reserved bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Publishes the whole reserved window.
    pub fn commit(self) {
        let len = self.len;
        self.commit_n(len);
    }

    /// Publishes the first `n` reserved bytes.
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
        self.publish(n);
    }

    fn publish(&mut self, n: usize) {
        self.committed = true;

        let shared = self.shared;
        let mut state = shared.state.lock();
        debug_assert_eq!(state.write_reserved, self.len, "reservation size drifted");
        state.write_reserved = 0;
        state.write_pos += n;
        if state.write_pos == shared.capacity {
            // The window never wraps, so the cursor lands exactly on the end.
            state.write_pos = 0;
        }
        state.level += n;
        debug_assert!(state.level <= shared.capacity, "ring level above capacity");

        if state.level >= shared.high_watermark {
            shared.source_cv.notify_all();
        }
    }
}

impl Deref for WriteReservation<'_> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        // SAFETY: [offset, offset + len) is covered by the outstanding write
        // reservation, which is exclusively ours until commit or drop. The
        // window is in bounds and never overlaps the consumer's region.
        unsafe { slice::from_raw_parts(self.shared.buf_ptr().add(self.offset), self.len) }
    }
}

impl DerefMut for WriteReservation<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in deref; the reservation grants exclusive mutable
        // access to this window.
        unsafe { slice::from_raw_parts_mut(self.shared.buf_ptr().add(self.offset), self.len) }
    }
}

impl Drop for WriteReservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            // Cancelled reservation: release the window, publish nothing.
            let mut state = self.shared.state.lock();
            state.write_reserved = 0;
        }
    }
}
