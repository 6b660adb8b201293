//! Transfer workers and the driver.
//!
//! The input worker pumps bytes from its endpoint into the ring on a
//! dedicated thread; the output worker pumps bytes from the ring into its
//! endpoint on the calling thread. Each worker always releases the peer via
//! `end_write`/`end_read` on the way out, whatever happened inside its loop.

use crate::drain::Drain;
use crate::endpoint::{self, EndpointOptions, Input, Output};
use crate::error::{exit_code, EndpointError, Error};
use crate::fifo::RingFifo;
use crate::options::Options;
use crate::source::Source;
use crate::stats::{Meter, Statistics, StatusLine};
use crate::FifoConfig;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use tracing::{error, warn};

/// Accumulated bytes that trigger a status line, and the minimum delay
/// between two lines.
const STATUS_BYTES: u64 = 256 * 1024;
const STATUS_INTERVAL_SECS: f64 = 0.3;

/// Emits the periodic one-line transfer report for one direction.
struct StatusReporter {
    label: &'static str,
    meter: Meter,
    pending: u64,
    next_due: f64,
    stats: Arc<Statistics>,
    line: Arc<StatusLine>,
}

impl StatusReporter {
    fn new(label: &'static str, stats: Arc<Statistics>, line: Arc<StatusLine>) -> Self {
        Self {
            label,
            meter: Meter::new(),
            pending: 0,
            next_due: STATUS_INTERVAL_SECS,
            stats,
            line,
        }
    }

    fn record(&mut self, len: usize) {
        self.meter.update(len);
        self.pending += len as u64;
        if self.pending > STATUS_BYTES {
            self.pending = 0;
            let secs = self.meter.seconds();
            if secs >= self.next_due {
                self.next_due = secs + STATUS_INTERVAL_SECS;
                self.emit();
            }
        }
    }

    fn emit(&self) {
        self.line.update(&format!(
            "{}: {} kiB at {:.1} kiB/s, {:.2} kiB/blk.; Fifo {} times full, {} times empty",
            self.label,
            self.meter.bytes() / 1024,
            self.meter.rate() / 1024.0,
            self.meter.avg_block_size() / 1024.0,
            self.stats.full_count(),
            self.stats.empty_count(),
        ));
    }
}

/// Pumps bytes from an input endpoint into the ring.
pub struct InputWorker {
    drain: Drain,
    input: Box<dyn Input>,
    request_size: usize,
    status: Option<StatusReporter>,
}

impl InputWorker {
    pub fn new(
        drain: Drain,
        input: Box<dyn Input>,
        request_size: usize,
        status_line: Option<Arc<StatusLine>>,
    ) -> Self {
        let status =
            status_line.map(|line| StatusReporter::new("Input", drain.statistics(), line));
        Self {
            drain,
            input,
            request_size,
            status,
        }
    }

    /// Runs the transfer loop to completion and returns the worker's exit
    /// code. `end_write` is signaled on every path out, so the consumer
    /// never stays blocked.
    pub fn run(mut self) -> u8 {
        let code = match panic::catch_unwind(AssertUnwindSafe(|| self.transfer())) {
            Ok(Ok(())) => exit_code::SUCCESS,
            Ok(Err(err)) => {
                error!("Error reading data: {err}");
                exit_code::INPUT_FAILED
            }
            Err(_) => {
                error!("Internal error in the input worker.");
                exit_code::LOGIC_ERROR
            }
        };
        self.drain.end_write();
        code
    }

    fn transfer(&mut self) -> Result<(), EndpointError> {
        self.input.initialize()?;
        loop {
            let Some(mut reservation) = self.drain.request_write(self.request_size) else {
                warn!("Closing the input and discarding buffered data because the output side stopped working.");
                break;
            };
            let n = self.input.read_data(&mut reservation)?;
            if n == 0 {
                // End of input; the untouched reservation is cancelled.
                break;
            }
            reservation.commit_n(n);
            if let Some(status) = &mut self.status {
                status.record(n);
            }
        }
        if let Some(status) = &self.status {
            status.emit();
        }
        Ok(())
    }
}

/// Pumps bytes from the ring into an output endpoint.
pub struct OutputWorker {
    source: Source,
    output: Box<dyn Output>,
    request_size: usize,
    status: Option<StatusReporter>,
}

impl OutputWorker {
    pub fn new(
        source: Source,
        output: Box<dyn Output>,
        request_size: usize,
        status_line: Option<Arc<StatusLine>>,
    ) -> Self {
        let status =
            status_line.map(|line| StatusReporter::new("Output", source.statistics(), line));
        Self {
            source,
            output,
            request_size,
            status,
        }
    }

    /// Runs the transfer loop to completion and returns the worker's exit
    /// code. `end_read` is signaled on every path out, so the producer
    /// never stays blocked.
    pub fn run(mut self) -> u8 {
        let code = match panic::catch_unwind(AssertUnwindSafe(|| self.transfer())) {
            Ok(Ok(())) => exit_code::SUCCESS,
            Ok(Err(err)) => {
                error!("Error writing data: {err}");
                exit_code::OUTPUT_FAILED
            }
            Err(_) => {
                error!("Internal error in the output worker.");
                exit_code::LOGIC_ERROR
            }
        };
        self.source.end_read();
        code
    }

    fn transfer(&mut self) -> Result<(), EndpointError> {
        self.output.initialize()?;
        loop {
            let Some(reservation) = self.source.request_read(self.request_size) else {
                // End of stream and the ring is drained.
                break;
            };
            let n = self.output.write_data(&reservation)?;
            if n == 0 {
                return Err(EndpointError::failed(
                    "Failed to write to the output stream because the destination does not accept more data.",
                ));
            }
            reservation.commit_n(n);
            if let Some(status) = &mut self.status {
                status.record(n);
            }
        }
        if let Some(status) = &self.status {
            status.emit();
        }
        Ok(())
    }
}

/// Builds the ring and the endpoints, runs both workers and returns the
/// process exit code.
///
/// The input worker runs on a spawned thread, the output worker on the
/// calling thread; the call returns after both finished. When both report
/// a failure the input worker's code wins.
pub fn run(options: &Options) -> Result<u8, Error> {
    let config = FifoConfig::new(
        options.buffer_size,
        options.high_fraction(),
        options.low_fraction(),
    );
    let (drain, source) = RingFifo::new(config).split();

    let endpoint_options = EndpointOptions {
        cache: options.cache,
        pipe_size: options.pipe_size,
    };
    let input = endpoint::open_input(&options.input, &endpoint_options)?;
    let output = endpoint::open_output(&options.output, &endpoint_options)?;

    let status_line = Arc::new(StatusLine::new());
    let request_size = options.effective_request_size();

    let input_worker = InputWorker::new(
        drain,
        input,
        request_size,
        options.input_stats.then(|| Arc::clone(&status_line)),
    );
    let output_worker = OutputWorker::new(
        source,
        output,
        request_size,
        options.output_stats.then(|| Arc::clone(&status_line)),
    );

    let input_thread = thread::Builder::new()
        .name("input".to_owned())
        .spawn(move || input_worker.run())
        .map_err(|e| Error::Runtime(format!("Failed to start the input worker thread: {e}")))?;

    let output_result = output_worker.run();
    // The worker catches its own panics; an Err here means it died without
    // reporting a result at all.
    let input_result = input_thread.join().unwrap_or(exit_code::UNKNOWN);

    status_line.finish();

    Ok(if input_result == exit_code::SUCCESS {
        output_result
    } else {
        input_result
    })
}
