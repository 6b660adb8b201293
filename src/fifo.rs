use crate::config::FifoConfig;
use crate::drain::Drain;
use crate::source::Source;
use crate::stats::Statistics;
use parking_lot::{Condvar, Mutex};
use std::alloc::{self, Layout};
use std::ptr::NonNull;
use std::sync::Arc;

// =============================================================================
// LOCKING & HANDOFF STRATEGY
// =============================================================================
//
// The ring is a contiguous byte buffer shared by exactly two threads: one
// producer driving the `Drain` half and one consumer driving the `Source`
// half. Coordination is deliberately lock-based (one mutex, two condvars)
// rather than lock-free: both sides block on real I/O anyway, and the
// watermarks exist precisely to make wakeups rare.
//
// ## State lock
//
// Every mutable field (`write_pos`, `read_pos`, `level`, the reservation
// sizes and `eos`) lives in `State` behind a single `parking_lot::Mutex`.
// Each public operation acquires the lock exactly once. Only the request
// calls ever wait; commits and the end-of-stream calls update state and
// notify without blocking.
//
// ## Condition variables
//
// - `drain_cv` wakes the producer: signaled when a read commit dropped
//   `level` to the low watermark or below, or when the consumer quit.
// - `source_cv` wakes the consumer: signaled when a write commit raised
//   `level` to the high watermark or above, or when the producer finished.
//
// All waits are predicate loops; spurious wakeups re-check and go back to
// sleep.
//
// ## Buffer access protocol
//
// The buffer pointer itself is never guarded. Safety comes from the
// reservation protocol: a write reservation covers `[write_pos,
// write_pos + write_reserved)`, a read reservation covers `[read_pos,
// read_pos + read_reserved)`, and the level arithmetic guarantees the two
// windows never overlap. Reservations are contiguous by construction; a
// window never wraps the ring end (a request near the end is simply
// truncated and the remainder served by the next request).
//
// =============================================================================

/// Mutable ring state, guarded by the state lock.
#[derive(Debug)]
pub(crate) struct State {
    /// Next byte offset to be written on commit.
    pub write_pos: usize,
    /// Next byte offset to be read on commit.
    pub read_pos: usize,
    /// Committed byte count, in `[0, capacity]`.
    pub level: usize,
    /// Size of the outstanding write reservation (0 = none).
    pub write_reserved: usize,
    /// Size of the outstanding read reservation (0 = none).
    pub read_reserved: usize,
    /// End-of-stream flag. Set by either side, never cleared.
    pub eos: bool,
}

/// Ring state shared by the two halves.
pub(crate) struct Shared {
    buf: AlignedBuf,
    pub capacity: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub state: Mutex<State>,
    pub drain_cv: Condvar,
    pub source_cv: Condvar,
    pub stats: Arc<Statistics>,
}

impl Shared {
    /// Base pointer of the aligned buffer. Callers derive slices from it
    /// only for windows covered by their own reservation.
    #[inline]
    pub fn buf_ptr(&self) -> *mut u8 {
        self.buf.as_ptr()
    }
}

/// Two-thread ring FIFO with watermark-driven flow control.
///
/// The ring hands out zero-copy reservations on both sides: the producer
/// writes directly into the buffer through a [`WriteReservation`] and the
/// consumer reads directly out of it through a [`ReadReservation`], so bytes
/// cross the ring without an intermediate copy. Watermarks provide
/// hysteresis: a side that had to wait is not woken again until the fill
/// level has moved far enough to make the wakeup worthwhile.
///
/// [`WriteReservation`]: crate::WriteReservation
/// [`ReadReservation`]: crate::ReadReservation
///
/// # Example
///
/// ```
/// use ringpump::{FifoConfig, RingFifo};
///
/// let fifo = RingFifo::new(FifoConfig::new(64, 0.0, 1.0));
/// let (mut drain, mut source) = fifo.split();
///
/// let residual = drain.write(b"hello");
/// assert_eq!(residual, 0);
/// drain.end_write();
///
/// let mut out = [0u8; 16];
/// let n = source.read(&mut out);
/// assert_eq!(&out[..n], b"hello");
/// ```
pub struct RingFifo {
    shared: Arc<Shared>,
}

impl RingFifo {
    /// Allocates the aligned buffer and initializes an empty ring.
    pub fn new(config: FifoConfig) -> Self {
        let shared = Shared {
            buf: AlignedBuf::new(config.capacity, config.alignment),
            capacity: config.capacity,
            high_watermark: config.high_watermark(),
            low_watermark: config.low_watermark(),
            state: Mutex::new(State {
                write_pos: 0,
                read_pos: 0,
                level: 0,
                write_reserved: 0,
                read_reserved: 0,
                eos: false,
            }),
            drain_cv: Condvar::new(),
            source_cv: Condvar::new(),
            stats: Arc::new(Statistics::default()),
        };

        Self {
            shared: Arc::new(shared),
        }
    }

    /// Returns the ring capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Handle to the wait counters, usable after [`split`](Self::split).
    pub fn statistics(&self) -> Arc<Statistics> {
        Arc::clone(&self.shared.stats)
    }

    /// Splits the ring into its producer and consumer halves.
    ///
    /// Each half is `Send` but not `Clone`: exactly one thread drives the
    /// drain and exactly one drives the source. The storage is freed when
    /// both halves are gone.
    pub fn split(self) -> (Drain, Source) {
        let drain = Drain::new(Arc::clone(&self.shared));
        let source = Source::new(self.shared);
        (drain, source)
    }
}

impl std::fmt::Debug for RingFifo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingFifo")
            .field("capacity", &self.shared.capacity)
            .field("high_watermark", &self.shared.high_watermark)
            .field("low_watermark", &self.shared.low_watermark)
            .finish_non_exhaustive()
    }
}

/// Fixed allocation whose start address honors a caller-chosen alignment,
/// so reservation windows can be handed to direct or DMA-style I/O.
///
/// Zero-initialized: reservations expose `&mut [u8]` windows and must never
/// read uninitialized memory even if a caller commits bytes it did not
/// write.
struct AlignedBuf {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl AlignedBuf {
    fn new(capacity: usize, alignment: usize) -> Self {
        let layout = Layout::from_size_align(capacity, alignment)
            .unwrap_or_else(|_| panic!("invalid ring layout: {capacity} bytes @ {alignment}"));

        // SAFETY: layout has non-zero size (capacity >= 1 is enforced by
        // FifoConfig::new).
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };

        Self { ptr, layout }
    }

    #[inline]
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // SAFETY: ptr was returned by alloc_zeroed with exactly this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

// SAFETY: the buffer is plain bytes; concurrent access is disciplined by the
// reservation protocol documented above, which guarantees the producer and
// consumer windows are disjoint.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_honors_alignment() {
        for align in [1usize, 64, 4096, 1 << 14] {
            let fifo = RingFifo::new(FifoConfig::new(100, 0.0, 1.0).with_alignment(align));
            let addr = fifo.shared.buf_ptr() as usize;
            assert_eq!(addr % align, 0, "buffer at {addr:#x} not {align}-aligned");
        }
    }

    #[test]
    fn new_ring_is_empty() {
        let fifo = RingFifo::new(FifoConfig::default());
        let state = fifo.shared.state.lock();
        assert_eq!(state.level, 0);
        assert_eq!(state.write_pos, 0);
        assert_eq!(state.read_pos, 0);
        assert!(!state.eos);
    }

    #[test]
    fn watermarks_derived_from_fractions() {
        let fifo = RingFifo::new(FifoConfig::new(1024, 0.5, 0.25));
        assert_eq!(fifo.shared.high_watermark, 512);
        assert_eq!(fifo.shared.low_watermark, 256);
    }

    #[test]
    fn capacity_one_allocates() {
        let fifo = RingFifo::new(FifoConfig::new(1, 0.0, 1.0));
        assert_eq!(fifo.capacity(), 1);
    }
}
