//! ringpump — a streaming buffer between two endpoints.
//!
//! Relays bytes from one input endpoint to one output endpoint through an
//! in-memory ring FIFO, decoupling a slow or bursty producer from a slow or
//! bursty consumer (tape drives, pipes, sockets, serial devices).
//!
//! # Key features
//!
//! - Zero-copy reserve/commit protocol on both sides of the ring: endpoint
//!   I/O reads into and writes out of the ring buffer directly
//! - Watermark hysteresis: a side that had to wait sleeps until the fill
//!   level makes the wakeup worthwhile, instead of thrashing on every byte
//! - Two-sided cooperative shutdown: either side can end the stream and the
//!   other side unblocks and drains
//! - Aligned buffer storage suitable for direct or DMA-style I/O
//!
//! # Example
//!
//! ```
//! use ringpump::{FifoConfig, RingFifo};
//! use std::thread;
//!
//! let fifo = RingFifo::new(FifoConfig::new(4096, 0.25, 0.75));
//! let (mut drain, mut source) = fifo.split();
//!
//! let producer = thread::spawn(move || {
//!     for chunk in [&b"hello "[..], &b"world"[..]] {
//!         // Zero-copy path: reserve a window, fill it in place, commit.
//!         let mut reservation = drain.request_write(chunk.len()).unwrap();
//!         let n = reservation.len();
//!         reservation[..n].copy_from_slice(&chunk[..n]);
//!         reservation.commit();
//!     }
//!     drain.end_write();
//! });
//!
//! let mut received = Vec::new();
//! while let Some(reservation) = source.request_read(4096) {
//!     received.extend_from_slice(&reservation);
//!     reservation.commit();
//! }
//! producer.join().unwrap();
//! assert_eq!(received, b"hello world");
//! ```

pub mod config;
pub mod drain;
pub mod endpoint;
pub mod error;
pub mod fifo;
pub mod options;
pub mod source;
pub mod stats;
pub mod worker;

pub use config::FifoConfig;
pub use drain::{Drain, WriteReservation};
pub use error::{exit_code, EndpointError, Error, SyntaxError};
pub use fifo::RingFifo;
pub use source::{ReadReservation, Source};
pub use stats::Statistics;
