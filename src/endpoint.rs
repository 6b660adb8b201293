//! Byte stream endpoints: regular files, standard streams, named pipes and
//! TCP sockets.
//!
//! An endpoint is picked from its specification string: `-` is the standard
//! stream, a `tcpip://` prefix selects TCP (empty host = listen and accept
//! exactly one connection), anything else is a filesystem path. Construction
//! only parses the specification; [`Input::initialize`] /
//! [`Output::initialize`] do the actual open/bind/connect and may block.

use crate::error::{EndpointError, Error, SyntaxError};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Prefix selecting a TCP endpoint specification.
#[cfg(not(windows))]
pub const TCP_PREFIX: &str = "tcpip://";
/// Prefix selecting a TCP endpoint specification (DOS-style separators).
#[cfg(windows)]
pub const TCP_PREFIX: &str = "tcpip:\\\\";

/// Endpoint tuning taken from the command line.
#[derive(Debug, Clone, Copy)]
pub struct EndpointOptions {
    /// Leave the OS file cache enabled for file endpoints.
    pub cache: bool,
    /// Kernel pipe buffer size for named pipe endpoints.
    pub pipe_size: usize,
}

/// A blocking byte source.
pub trait Input: Send {
    /// Opens the underlying resource. May block (e.g. waiting for a TCP
    /// peer or a pipe reader).
    fn initialize(&mut self) -> Result<(), EndpointError>;

    /// Reads up to `buf.len()` bytes. Returns 0 at end of input.
    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError>;
}

/// A blocking byte sink.
pub trait Output: Send {
    /// Opens the underlying resource. May block.
    fn initialize(&mut self) -> Result<(), EndpointError>;

    /// Writes up to `buf.len()` bytes, returning how many were accepted.
    /// Returning 0 means the destination refuses more data.
    fn write_data(&mut self, buf: &[u8]) -> Result<usize, EndpointError>;
}

/// Builds the input endpoint for a specification.
pub fn open_input(spec: &str, options: &EndpointOptions) -> Result<Box<dyn Input>, Error> {
    if spec == "-" {
        return Ok(Box::new(StdStreamInput::new()));
    }
    if let Some(rest) = spec.strip_prefix(TCP_PREFIX) {
        return Ok(Box::new(TcpEndpoint::parse(rest)?));
    }
    Ok(Box::new(FileInput::new(spec, options)))
}

/// Builds the output endpoint for a specification.
pub fn open_output(spec: &str, options: &EndpointOptions) -> Result<Box<dyn Output>, Error> {
    if spec == "-" {
        return Ok(Box::new(StdStreamOutput::new()));
    }
    if let Some(rest) = spec.strip_prefix(TCP_PREFIX) {
        return Ok(Box::new(TcpEndpoint::parse(rest)?));
    }
    Ok(Box::new(FileOutput::new(spec, options)))
}

// ---------------------------------------------------------------------
// FILE ENDPOINTS (regular files and named pipes)
// ---------------------------------------------------------------------

/// File input. Unless the cache is enabled the file is opened with
/// `O_SYNC`, keeping the transfer honest towards removable or slow media.
pub struct FileInput {
    path: PathBuf,
    cache: bool,
    pipe_size: usize,
    file: Option<File>,
}

impl FileInput {
    pub fn new(spec: &str, options: &EndpointOptions) -> Self {
        Self {
            path: PathBuf::from(spec),
            cache: options.cache,
            pipe_size: options.pipe_size,
            file: None,
        }
    }
}

impl Input for FileInput {
    fn initialize(&mut self) -> Result<(), EndpointError> {
        let mut open = OpenOptions::new();
        open.read(true);
        apply_cache_policy(&mut open, self.cache);
        let file = open.open(&self.path).map_err(|e| {
            EndpointError::io(format!("Failed to open {} for input", self.path.display()), e)
        })?;
        configure_pipe(&file, self.pipe_size);
        self.file = Some(file);
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        let Some(file) = self.file.as_mut() else {
            return Err(EndpointError::failed("input endpoint used before initialize"));
        };
        file.read(buf)
            .map_err(|e| EndpointError::io("Failed to read from input stream", e))
    }
}

/// File output. The file is created or truncated; `O_SYNC` applies as for
/// input.
pub struct FileOutput {
    path: PathBuf,
    cache: bool,
    pipe_size: usize,
    file: Option<File>,
}

impl FileOutput {
    pub fn new(spec: &str, options: &EndpointOptions) -> Self {
        Self {
            path: PathBuf::from(spec),
            cache: options.cache,
            pipe_size: options.pipe_size,
            file: None,
        }
    }
}

impl Output for FileOutput {
    fn initialize(&mut self) -> Result<(), EndpointError> {
        let mut open = OpenOptions::new();
        open.write(true).create(true).truncate(true);
        apply_cache_policy(&mut open, self.cache);
        let file = open.open(&self.path).map_err(|e| {
            EndpointError::io(format!("Failed to open {} for output", self.path.display()), e)
        })?;
        configure_pipe(&file, self.pipe_size);
        self.file = Some(file);
        Ok(())
    }

    fn write_data(&mut self, buf: &[u8]) -> Result<usize, EndpointError> {
        let Some(file) = self.file.as_mut() else {
            return Err(EndpointError::failed("output endpoint used before initialize"));
        };
        file.write(buf)
            .map_err(|e| EndpointError::io("Failed to write to output stream", e))
    }
}

#[cfg(unix)]
fn apply_cache_policy(open: &mut OpenOptions, cache: bool) {
    use std::os::unix::fs::OpenOptionsExt;
    if !cache {
        open.custom_flags(libc::O_SYNC);
    }
}

#[cfg(not(unix))]
fn apply_cache_policy(_open: &mut OpenOptions, _cache: bool) {}

/// Sizes the kernel pipe buffer when the opened path turned out to be a
/// named pipe. The kernel rounds the size up to a page multiple; failure
/// (e.g. beyond `/proc/sys/fs/pipe-max-size`) is reported but not fatal.
#[cfg(target_os = "linux")]
fn configure_pipe(file: &File, pipe_size: usize) {
    use std::os::unix::fs::FileTypeExt;
    use std::os::unix::io::AsRawFd;

    let is_fifo = file
        .metadata()
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false);
    if !is_fifo {
        return;
    }

    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_SETPIPE_SZ, pipe_size as libc::c_int) };
    if rc == -1 {
        warn!(
            "failed to size pipe buffer to {pipe_size} bytes: {}",
            io::Error::last_os_error()
        );
    } else {
        debug!("pipe buffer sized to {rc} bytes");
    }
}

#[cfg(not(target_os = "linux"))]
fn configure_pipe(_file: &File, _pipe_size: usize) {}

// ---------------------------------------------------------------------
// STANDARD STREAM ENDPOINTS
// ---------------------------------------------------------------------

/// Standard input. Nothing to open; reads lock the global handle per call.
pub struct StdStreamInput {
    stdin: io::Stdin,
}

impl StdStreamInput {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }
}

impl Default for StdStreamInput {
    fn default() -> Self {
        Self::new()
    }
}

impl Input for StdStreamInput {
    fn initialize(&mut self) -> Result<(), EndpointError> {
        Ok(())
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        self.stdin
            .read(buf)
            .map_err(|e| EndpointError::io("Failed to read from standard input", e))
    }
}

/// Standard output. Each block is flushed through the global handle so no
/// bytes linger in userspace buffers when the transfer stalls.
pub struct StdStreamOutput {
    stdout: io::Stdout,
}

impl StdStreamOutput {
    pub fn new() -> Self {
        Self {
            stdout: io::stdout(),
        }
    }
}

impl Default for StdStreamOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Output for StdStreamOutput {
    fn initialize(&mut self) -> Result<(), EndpointError> {
        Ok(())
    }

    fn write_data(&mut self, buf: &[u8]) -> Result<usize, EndpointError> {
        let n = self
            .stdout
            .write(buf)
            .map_err(|e| EndpointError::io("Failed to write to standard output", e))?;
        self.stdout
            .flush()
            .map_err(|e| EndpointError::io("Failed to flush standard output", e))?;
        Ok(n)
    }
}

// ---------------------------------------------------------------------
// TCP ENDPOINTS
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TcpMode {
    /// Bind, listen, accept exactly one connection.
    Listen(SocketAddr),
    /// Connect to a remote peer.
    Connect(SocketAddr),
}

/// A TCP endpoint, usable as input or output.
///
/// The specification remainder is `host:port`. An empty host means listen;
/// otherwise the host is resolved and connected to. Name resolution happens
/// at parse time (before any worker thread exists), connecting and
/// accepting happen in `initialize`.
#[derive(Debug)]
pub struct TcpEndpoint {
    mode: TcpMode,
    display: String,
    stream: Option<TcpStream>,
}

impl TcpEndpoint {
    pub fn parse(rest: &str) -> Result<Self, Error> {
        let Some((host, port)) = rest.rsplit_once(':') else {
            return Err(SyntaxError::new(format!(
                "The TCP endpoint {TCP_PREFIX}{rest} does not contain a port number; \
                 {TCP_PREFIX}host:port expected."
            ))
            .into());
        };

        let port: u16 = port.parse().map_err(|_| {
            SyntaxError::new(format!("The port '{port}' is not a number in the range 0-65535."))
        })?;

        let mode = if host.is_empty() {
            TcpMode::Listen(SocketAddr::from(([0, 0, 0, 0], port)))
        } else {
            TcpMode::Connect(resolve(host, port)?)
        };

        Ok(Self {
            mode,
            display: rest.to_owned(),
            stream: None,
        })
    }

    fn connect(&mut self) -> Result<(), EndpointError> {
        let stream = match self.mode {
            TcpMode::Listen(addr) => {
                let listener = TcpListener::bind(addr)
                    .map_err(|e| EndpointError::io(format!("Failed to bind {addr}"), e))?;
                let (stream, peer) = listener.accept().map_err(|e| {
                    EndpointError::io(format!("Failed to accept a connection on {addr}"), e)
                })?;
                debug!("accepted connection from {peer}");
                // Dropping the listener refuses further connections.
                stream
            }
            TcpMode::Connect(addr) => TcpStream::connect(addr)
                .map_err(|e| EndpointError::io(format!("Failed to connect to {addr}"), e))?,
        };
        self.stream = Some(stream);
        Ok(())
    }
}

/// Resolves `host:port`, preferring an IPv4 address like the classic
/// socket stack did.
fn resolve(host: &str, port: u16) -> Result<SocketAddr, Error> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Runtime(format!("The host name {host} cannot be resolved: {e}")))?
        .collect();

    addrs
        .iter()
        .copied()
        .find(SocketAddr::is_ipv4)
        .or_else(|| addrs.first().copied())
        .ok_or_else(|| Error::Runtime(format!("The host name {host} resolves to no addresses.")))
}

impl Input for TcpEndpoint {
    fn initialize(&mut self) -> Result<(), EndpointError> {
        self.connect()
    }

    fn read_data(&mut self, buf: &mut [u8]) -> Result<usize, EndpointError> {
        let display = &self.display;
        let Some(stream) = self.stream.as_mut() else {
            return Err(EndpointError::failed("TCP endpoint used before initialize"));
        };
        stream
            .read(buf)
            .map_err(|e| EndpointError::io(format!("Error while receiving data from {display}"), e))
    }
}

impl Output for TcpEndpoint {
    fn initialize(&mut self) -> Result<(), EndpointError> {
        self.connect()
    }

    fn write_data(&mut self, buf: &[u8]) -> Result<usize, EndpointError> {
        let display = &self.display;
        let Some(stream) = self.stream.as_mut() else {
            return Err(EndpointError::failed("TCP endpoint used before initialize"));
        };
        stream
            .write(buf)
            .map_err(|e| EndpointError::io(format!("Error while sending data to {display}"), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_spec_with_host_connects() {
        let endpoint = TcpEndpoint::parse("127.0.0.1:9000").unwrap();
        assert_eq!(
            endpoint.mode,
            TcpMode::Connect(SocketAddr::from(([127, 0, 0, 1], 9000)))
        );
    }

    #[test]
    fn tcp_spec_with_empty_host_listens() {
        let endpoint = TcpEndpoint::parse(":7000").unwrap();
        assert_eq!(
            endpoint.mode,
            TcpMode::Listen(SocketAddr::from(([0, 0, 0, 0], 7000)))
        );
    }

    #[test]
    fn tcp_spec_without_port_is_a_syntax_error() {
        let err = TcpEndpoint::parse("somehost").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "got {err:?}");
    }

    #[test]
    fn tcp_spec_with_bad_port_is_a_syntax_error() {
        let err = TcpEndpoint::parse("host:http").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "got {err:?}");
        let err = TcpEndpoint::parse("host:70000").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)), "got {err:?}");
    }

    #[test]
    fn file_input_reads_back_what_was_written() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"endpoint payload").unwrap();
        tmp.flush().unwrap();

        let options = EndpointOptions {
            cache: true,
            pipe_size: 8192,
        };
        let mut input = FileInput::new(tmp.path().to_str().unwrap(), &options);
        input.initialize().unwrap();

        let mut buf = [0u8; 64];
        let n = input.read_data(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"endpoint payload");
        assert_eq!(input.read_data(&mut buf).unwrap(), 0);
    }

    #[test]
    fn file_output_truncates_existing_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, b"stale contents that must vanish").unwrap();

        let options = EndpointOptions {
            cache: true,
            pipe_size: 8192,
        };
        let mut output = FileOutput::new(path.to_str().unwrap(), &options);
        output.initialize().unwrap();
        let n = output.write_data(b"fresh").unwrap();
        assert_eq!(n, 5);
        drop(output);

        assert_eq!(std::fs::read(&path).unwrap(), b"fresh");
    }

    #[test]
    fn missing_input_file_fails_on_initialize() {
        let options = EndpointOptions {
            cache: true,
            pipe_size: 8192,
        };
        let mut input = FileInput::new("/nonexistent/ringpump/input", &options);
        assert!(input.initialize().is_err());
    }

    #[test]
    fn stdio_spec_selects_standard_streams() {
        let options = EndpointOptions {
            cache: false,
            pipe_size: 8192,
        };
        // Just exercising the factory dispatch; the handles are process-global.
        assert!(open_input("-", &options).is_ok());
        assert!(open_output("-", &options).is_ok());
    }
}
