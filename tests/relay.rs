//! End-to-end transfer tests: the driver against real files and sockets,
//! plus the two-thread shutdown and hysteresis scenarios at the ring level.

use rand::Rng;
use ringpump::options::{self, Command};
use ringpump::{worker, Error, FifoConfig, RingFifo};
use std::fs;
use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Parses a command line and runs the driver, returning the exit code.
fn run_cli(args: &[&str]) -> u8 {
    let full: Vec<String> = std::iter::once("ringpump")
        .chain(args.iter().copied())
        .map(str::to_owned)
        .collect();
    match options::parse(full).expect("command line must parse") {
        Command::Run(opts) => worker::run(&opts).expect("setup must succeed"),
        Command::Usage { .. } => panic!("unexpected usage output"),
    }
}

#[test]
fn basic_copy_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    fs::write(&input, b"hello world").unwrap();

    let code = run_cli(&[
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "-b=64",
        "-h=1",
        "-l=63",
    ]);

    assert_eq!(code, 0);
    assert_eq!(fs::read(&output).unwrap(), b"hello world");
}

#[test]
fn large_payload_through_a_tiny_ring() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.bin");
    fs::write(&input, vec![b'A'; 1_000_000]).unwrap();

    // -c keeps O_SYNC out of the 4-byte write path.
    let code = run_cli(&[
        input.to_str().unwrap(),
        output.to_str().unwrap(),
        "-b=16",
        "-c",
    ]);

    assert_eq!(code, 0);
    let copied = fs::read(&output).unwrap();
    assert_eq!(copied.len(), 1_000_000);
    assert!(copied.iter().all(|&b| b == b'A'));
}

#[test]
fn tcp_listener_accepts_one_connection_as_input() {
    let port = free_port();
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("wire.bin");

    let sender = thread::spawn(move || {
        // The driver needs a moment to bind; retry until it listens.
        for _ in 0..100 {
            if let Ok(mut stream) = TcpStream::connect(("127.0.0.1", port)) {
                stream.write_all(b"over the wire").unwrap();
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        panic!("listener never came up on port {port}");
    });

    let spec = format!("tcpip://:{port}");
    let code = run_cli(&[&spec, output.to_str().unwrap(), "-b=1k", "-c"]);

    sender.join().unwrap();
    assert_eq!(code, 0);
    assert_eq!(fs::read(&output).unwrap(), b"over the wire");
}

#[test]
fn tcp_client_delivers_the_file_as_output() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let port = listener.local_addr().unwrap().port();

    let receiver = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut received = Vec::new();
        std::io::Read::read_to_end(&mut stream, &mut received).unwrap();
        received
    });

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.bin");
    fs::write(&input, b"file to socket").unwrap();

    let spec = format!("tcpip://127.0.0.1:{port}");
    let code = run_cli(&[input.to_str().unwrap(), &spec, "-b=256"]);

    assert_eq!(code, 0);
    assert_eq!(receiver.join().unwrap(), b"file to socket");
}

#[test]
fn producer_eof_drains_the_buffered_tail() {
    // High watermark at 100%: the consumer would normally sleep until the
    // ring is full, but end_write must release it regardless.
    let fifo = RingFifo::new(FifoConfig::new(4096, 1.0, 1.0));
    let (mut drain, mut source) = fifo.split();

    let producer = thread::spawn(move || {
        assert_eq!(drain.write(&[42u8; 100]), 0);
        drain.end_write();
    });

    // Consumer stalls while the producer finishes.
    thread::sleep(Duration::from_millis(50));

    let mut out = [0u8; 200];
    let n = source.read(&mut out);
    assert_eq!(n, 100);
    assert!(out[..n].iter().all(|&b| b == 42));
    assert!(source.request_read(1).is_none());
    producer.join().unwrap();
}

#[test]
fn consumer_quit_unblocks_a_full_producer() {
    let fifo = RingFifo::new(FifoConfig::new(16, 0.0, 1.0));
    let (mut drain, mut source) = fifo.split();

    let producer = thread::spawn(move || drain.write(&[7u8; 8192]));

    let first = source.request_read(1).unwrap();
    assert_eq!(&*first, &[7]);
    first.commit();
    source.end_read();

    // The producer was stuck in a full ring; it must come back with the
    // residual instead of hanging.
    let residual = producer.join().unwrap();
    assert!(residual > 0, "producer claims everything was written");
}

#[test]
fn high_watermark_defers_consumer_wakeup() {
    let fifo = RingFifo::new(FifoConfig::new(1024, 0.5, 0.25));
    let stats = fifo.statistics();
    let (mut drain, mut source) = fifo.split();

    let woke = Arc::new(AtomicBool::new(false));
    let woke_flag = Arc::clone(&woke);
    let consumer = thread::spawn(move || {
        let reservation = source.request_read(1024).unwrap();
        woke_flag.store(true, Ordering::SeqCst);
        let n = reservation.len();
        reservation.commit();
        n
    });

    // Let the consumer block on the empty ring.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(stats.empty_count(), 1);

    // Below the high watermark: no wakeup.
    assert_eq!(drain.write(&[1u8; 100]), 0);
    thread::sleep(Duration::from_millis(50));
    assert!(
        !woke.load(Ordering::SeqCst),
        "consumer woke below the high watermark"
    );

    // Crossing it releases the consumer, which sees the whole batch.
    assert_eq!(drain.write(&[2u8; 412]), 0);
    assert_eq!(consumer.join().unwrap(), 512);
}

#[test]
fn low_watermark_defers_producer_wakeup() {
    let fifo = RingFifo::new(FifoConfig::new(1024, 0.0, 0.25));
    let stats = fifo.statistics();
    let (mut drain, mut source) = fifo.split();

    assert_eq!(drain.write(&[9u8; 1024]), 0);

    let woke = Arc::new(AtomicBool::new(false));
    let woke_flag = Arc::clone(&woke);
    let producer = thread::spawn(move || {
        let reservation = drain.request_write(512).unwrap();
        woke_flag.store(true, Ordering::SeqCst);
        let n = reservation.len();
        reservation.commit_n(0);
        n
    });

    thread::sleep(Duration::from_millis(50));
    assert_eq!(stats.full_count(), 1);

    // Drain 100 bytes: still above the low watermark, producer sleeps on.
    let mut buf = [0u8; 100];
    assert_eq!(source.read(&mut buf), 100);
    thread::sleep(Duration::from_millis(50));
    assert!(
        !woke.load(Ordering::SeqCst),
        "producer woke above the low watermark"
    );

    // Reaching the low watermark releases it with the freed space.
    let mut buf = vec![0u8; 668];
    assert_eq!(source.read(&mut buf), 668);
    assert_eq!(producer.join().unwrap(), 512);
}

#[test]
fn negative_buffer_size_is_a_syntax_error() {
    let args: Vec<String> = ["ringpump", "in", "out", "-b=-1"]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
    let err: Error = options::parse(args).unwrap_err().into();
    assert_eq!(err.exit_code(), 49);
    assert!(err.to_string().contains("positive"), "{err}");
}

#[test]
fn random_payloads_roundtrip_under_random_watermarks() {
    let mut rng = rand::thread_rng();

    for _ in 0..8 {
        let capacity = rng.gen_range(1..=256);
        let high = rng.gen_range(0.0..=1.0);
        let low = rng.gen_range(0.0..=1.0);
        let len = rng.gen_range(0..=64 * 1024);
        let payload: Vec<u8> = (0..len).map(|_| rng.gen()).collect();

        let fifo = RingFifo::new(FifoConfig::new(capacity, high, low));
        let (mut drain, mut source) = fifo.split();

        let sent = payload.clone();
        let producer = thread::spawn(move || {
            assert_eq!(drain.write(&sent), 0);
            drain.end_write();
        });

        let mut received = vec![0u8; len + 1];
        let n = source.read(&mut received);
        producer.join().unwrap();

        assert_eq!(n, len, "capacity {capacity}, high {high}, low {low}");
        assert_eq!(&received[..n], &payload[..]);
    }
}

fn free_port() -> u16 {
    TcpListener::bind(("127.0.0.1", 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}
