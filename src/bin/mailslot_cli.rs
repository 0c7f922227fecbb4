use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use hdrhistogram::Histogram;
use log::info;

use mailslot::control::{
    CHANGE_MAX_DATA_UNIT_SIZE, CHANGE_READ_BLOCKING_MODE, CHANGE_WRITE_BLOCKING_MODE,
};
use mailslot::{Command, Error, Interrupter, Registry, RegistryConfig, Session};

#[derive(Parser)]
#[command(name = "mailslot-cli", version, about = "FIFO mail slot tooling")]
struct Cli {
    /// JSON registry configuration (see RegistryConfig)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the byte capacity of each slot
    #[arg(long, global = true)]
    max_storage: Option<usize>,

    /// Override the initial max data unit size of each slot
    #[arg(long, global = true)]
    max_data_unit_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write lines from stdin until "stop", then read them back in order
    Fifo {
        #[arg(long, default_value_t = 0)]
        minor: u32,
    },
    /// Run one of the driver's scenario programs
    Scenario {
        #[arg(value_enum)]
        name: Scenario,
        #[arg(long, default_value_t = 0)]
        minor: u32,
        /// Delay before the peer thread acts in the blocking scenarios
        #[arg(long, default_value_t = 1000)]
        delay_ms: u64,
    },
    /// Concurrent write/read throughput
    Bench {
        #[arg(long, default_value_t = 0)]
        minor: u32,
        #[arg(long, default_value_t = 4)]
        writers: usize,
        #[arg(long, default_value_t = 4)]
        readers: usize,
        #[arg(long, default_value_t = 100_000)]
        messages: u64,
        #[arg(long = "payload-bytes", default_value_t = 64)]
        payload_bytes: usize,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Scenario {
    MsgLen,
    ReadBlocking,
    ReadNonBlocking,
    WriteBlocking,
    WriteNonBlocking,
}

static SIGINT_RECEIVED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_signal: libc::c_int) {
    SIGINT_RECEIVED.store(true, Ordering::Release);
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let registry = Registry::new(load_config(&cli)?).context("invalid configuration")?;
    let mut out = BufWriter::new(io::stdout());
    match cli.command {
        Commands::Fifo { minor } => cmd_fifo(&registry, minor, &mut out)?,
        Commands::Scenario {
            name,
            minor,
            delay_ms,
        } => cmd_scenario(&registry, name, minor, Duration::from_millis(delay_ms), &mut out)?,
        Commands::Bench {
            minor,
            writers,
            readers,
            messages,
            payload_bytes,
        } => cmd_bench(&registry, minor, writers, readers, messages, payload_bytes, &mut out)?,
    }
    out.flush()?;
    let report = registry.teardown();
    info!(
        "teardown: {} slots, {} messages ({} bytes) discarded",
        report.slots, report.messages, report.bytes
    );
    Ok(())
}

fn load_config(cli: &Cli) -> Result<RegistryConfig> {
    let mut config = match &cli.config {
        Some(path) => RegistryConfig::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => RegistryConfig::default(),
    };
    if let Some(max_storage) = cli.max_storage {
        config.slot.max_storage = max_storage;
        config.slot.max_data_unit_size_ceiling =
            config.slot.max_data_unit_size_ceiling.min(max_storage);
    }
    if let Some(size) = cli.max_data_unit_size {
        config.slot.max_data_unit_size = size;
    }
    Ok(config)
}

/// Routes Ctrl-C to `interrupter` instead of terminating the process.
fn forward_sigint(interrupter: Interrupter) -> Result<()> {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        return Err(io::Error::last_os_error()).context("failed to install SIGINT handler");
    }
    thread::Builder::new()
        .name("sigint-forward".to_string())
        .spawn(move || loop {
            if SIGINT_RECEIVED.swap(false, Ordering::AcqRel) {
                info!("SIGINT received, interrupting blocked calls");
                interrupter.interrupt();
            }
            thread::sleep(Duration::from_millis(50));
        })
        .context("failed to spawn SIGINT forwarder")?;
    Ok(())
}

/// Empties the slot before a scenario, the way the driver's test programs did.
fn drain(session: &Session) -> Result<usize> {
    let blocking = session.control(Command::GetBlockingRead)?;
    session.ioctl(CHANGE_READ_BLOCKING_MODE, 0)?;
    let capacity = session.slot().max_data_unit_size_ceiling();
    let mut drained = 0;
    loop {
        match session.recv(capacity) {
            Ok(_) => drained += 1,
            Err(Error::WouldBlock) if session.stats().pending_count == 0 => break,
            Err(Error::WouldBlock) => continue,
            Err(err) => {
                session.ioctl(CHANGE_READ_BLOCKING_MODE, blocking)?;
                return Err(err.into());
            }
        }
    }
    session.ioctl(CHANGE_READ_BLOCKING_MODE, blocking)?;
    Ok(drained)
}

fn cmd_fifo(registry: &Registry, minor: u32, out: &mut dyn Write) -> Result<()> {
    let session = registry.open(minor)?;
    drain(&session)?;

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    let mut count = 0usize;
    loop {
        write!(out, "insert a message or type 'stop' to terminate: ")?;
        out.flush()?;
        let Some(line) = lines.next() else { break };
        let line = line?;
        if line.starts_with("stop") {
            break;
        }
        let mut payload = line.into_bytes();
        payload.push(0);
        session
            .write(&payload)
            .context("write failed")?;
        count += 1;
    }

    writeln!(out, "\nread messages:")?;
    let capacity = session.slot().max_data_unit_size();
    for _ in 0..count {
        let payload = session.recv(capacity).context("read failed")?;
        let text = payload.strip_suffix(&[0]).unwrap_or(&payload);
        writeln!(out, "{}", String::from_utf8_lossy(text))?;
    }
    Ok(())
}

fn check(out: &mut dyn Write, label: &str, passed: bool) -> io::Result<()> {
    writeln!(out, "{label} - {}", if passed { "PASSED" } else { "NOT PASSED" })
}

fn cmd_scenario(
    registry: &Registry,
    scenario: Scenario,
    minor: u32,
    delay: Duration,
    out: &mut dyn Write,
) -> Result<()> {
    let session = registry.open(minor)?;
    forward_sigint(session.interrupter())?;
    let drained = drain(&session)?;
    info!("scenario {scenario:?}: drained {drained} messages from slot {minor}");

    match scenario {
        Scenario::MsgLen => scenario_msg_len(&session, out)?,
        Scenario::ReadBlocking => scenario_read_blocking(&session, delay, out)?,
        Scenario::ReadNonBlocking => scenario_read_non_blocking(&session, out)?,
        Scenario::WriteBlocking => scenario_write_blocking(&session, delay, out)?,
        Scenario::WriteNonBlocking => scenario_write_non_blocking(&session, out)?,
    }
    Ok(())
}

fn scenario_msg_len(session: &Session, out: &mut dyn Write) -> Result<()> {
    let mut buf = [0u8; 8];
    let ceiling = session.slot().max_data_unit_size_ceiling() as u64;

    check(out, "TEST 1: len = 0", session.write(b"").is_err())?;
    session.ioctl(CHANGE_MAX_DATA_UNIT_SIZE, 2)?;
    check(out, "TEST 2: len > max_data_unit_size", session.write(b"test\0").is_err())?;
    check(out, "TEST 3: len = max_data_unit_size", session.write(b"t\0").is_ok())?;
    session.ioctl(CHANGE_MAX_DATA_UNIT_SIZE, 5)?;
    check(out, "TEST 4: len = max_data_unit_size", session.write(b"test\0").is_ok())?;
    check(
        out,
        "TEST 5: len_to_read < first data unit size",
        session.read(&mut buf[..1]).is_err(),
    )?;
    check(
        out,
        "TEST 6: len_to_read = first data unit size",
        session.read(&mut buf[..2]).is_ok(),
    )?;
    check(
        out,
        "TEST 7: len_to_read < first data unit size",
        session.read(&mut buf[..2]).is_err(),
    )?;
    check(
        out,
        "TEST 8: len_to_read = first data unit size",
        session.read(&mut buf[..5]).is_ok(),
    )?;
    session.ioctl(CHANGE_MAX_DATA_UNIT_SIZE, ceiling)?;
    Ok(())
}

fn scenario_read_blocking(session: &Session, delay: Duration, out: &mut dyn Write) -> Result<()> {
    let capacity = session.slot().max_data_unit_size();
    let started = Instant::now();
    let (read, wrote) = thread::scope(|s| {
        let reader = s.spawn(|| session.recv(capacity));
        let writer = s.spawn(|| {
            thread::sleep(delay);
            session.write(b"test\0")
        });
        (reader.join(), writer.join())
    });
    let read = read.map_err(|_| anyhow::anyhow!("reader thread panicked"))?;
    let wrote = wrote.map_err(|_| anyhow::anyhow!("writer thread panicked"))?;
    match &read {
        Ok(payload) => writeln!(
            out,
            "reader blocked {} ms, received {} bytes",
            started.elapsed().as_millis(),
            payload.len()
        )?,
        Err(Error::Interrupted) => writeln!(out, "reader interrupted")?,
        Err(err) => writeln!(out, "reader failed: {err}")?,
    }
    if let Err(err) = wrote {
        writeln!(out, "writer failed: {err}")?;
    }
    check(out, "blocking read waits for a writer", read.is_ok())?;
    Ok(())
}

fn scenario_read_non_blocking(session: &Session, out: &mut dyn Write) -> Result<()> {
    session.ioctl(CHANGE_READ_BLOCKING_MODE, 0)?;
    let started = Instant::now();
    let res = session.recv(session.slot().max_data_unit_size());
    writeln!(out, "read returned after {} us", started.elapsed().as_micros())?;
    check(
        out,
        "non-blocking read on an empty slot",
        matches!(res, Err(Error::WouldBlock)),
    )?;
    session.ioctl(CHANGE_READ_BLOCKING_MODE, 1)?;
    Ok(())
}

/// Fills the slot with full-size messages; returns how many fit.
fn fill(session: &Session) -> Result<usize> {
    let unit = session.slot().max_data_unit_size();
    let payload = vec![b't'; unit];
    let fits = session.slot().free_space() / unit;
    for _ in 0..fits {
        session.write(&payload)?;
    }
    Ok(fits)
}

fn scenario_write_blocking(session: &Session, delay: Duration, out: &mut dyn Write) -> Result<()> {
    let filled = fill(session)?;
    let unit = session.slot().max_data_unit_size();
    if session.slot().free_space() >= unit {
        bail!("slot not full after {filled} writes");
    }
    writeln!(out, "filled slot with {filled} messages of {unit} bytes")?;

    let started = Instant::now();
    let (wrote, read) = thread::scope(|s| {
        let writer = s.spawn(|| session.write(&vec![b't'; unit]));
        let reader = s.spawn(|| {
            thread::sleep(delay);
            session.recv(unit)
        });
        (writer.join(), reader.join())
    });
    let wrote = wrote.map_err(|_| anyhow::anyhow!("writer thread panicked"))?;
    let read = read.map_err(|_| anyhow::anyhow!("reader thread panicked"))?;
    if let Err(err) = &read {
        writeln!(out, "reader failed: {err}")?;
    }
    match &wrote {
        Ok(len) => writeln!(
            out,
            "writer blocked {} ms, wrote {len} bytes",
            started.elapsed().as_millis()
        )?,
        Err(err) => writeln!(out, "writer failed: {err}")?,
    }
    check(out, "blocking write waits for free space", wrote.is_ok())?;
    drain(session)?;
    Ok(())
}

fn scenario_write_non_blocking(session: &Session, out: &mut dyn Write) -> Result<()> {
    session.ioctl(CHANGE_WRITE_BLOCKING_MODE, 0)?;
    let filled = fill(session)?;
    let unit = session.slot().max_data_unit_size();
    let res = session.write(&vec![b't'; unit]);
    if let Err(err) = &res {
        writeln!(out, "insufficient space or lock not available: {err}")?;
    }
    writeln!(out, "filled slot with {filled} messages of {unit} bytes")?;
    check(
        out,
        "non-blocking write on a full slot",
        matches!(res, Err(Error::WouldBlock)),
    )?;
    session.ioctl(CHANGE_WRITE_BLOCKING_MODE, 1)?;
    drain(session)?;
    Ok(())
}

fn share(total: u64, parts: usize, index: usize) -> u64 {
    let parts = parts as u64;
    let index = index as u64;
    total / parts + u64::from(index < total % parts)
}

fn cmd_bench(
    registry: &Registry,
    minor: u32,
    writers: usize,
    readers: usize,
    messages: u64,
    payload_bytes: usize,
    out: &mut dyn Write,
) -> Result<()> {
    if writers == 0 || readers == 0 {
        bail!("bench needs at least one writer and one reader");
    }
    let session = Arc::new(registry.open(minor)?);
    session.control(Command::SetBlockingWrite(true))?;
    session.control(Command::SetBlockingRead(true))?;
    session.control(Command::SetMaxDataUnitSize(payload_bytes))?;
    writeln!(
        out,
        "minor={minor} writers={writers} readers={readers} messages={messages} payload_bytes={payload_bytes}"
    )?;

    let started = Instant::now();
    let histogram = thread::scope(|s| -> Result<Histogram<u64>> {
        let mut writer_handles = Vec::with_capacity(writers);
        for index in 0..writers {
            let session = Arc::clone(&session);
            let count = share(messages, writers, index);
            writer_handles.push(s.spawn(move || -> Result<Histogram<u64>> {
                let payload = vec![0u8; payload_bytes];
                let mut histogram = Histogram::<u64>::new(3)?;
                for _ in 0..count {
                    let start = Instant::now();
                    session.write(&payload)?;
                    histogram.saturating_record(start.elapsed().as_nanos() as u64);
                }
                Ok(histogram)
            }));
        }
        let mut reader_handles = Vec::with_capacity(readers);
        for index in 0..readers {
            let session = Arc::clone(&session);
            let count = share(messages, readers, index);
            reader_handles.push(s.spawn(move || -> Result<()> {
                let mut buf = vec![0u8; payload_bytes];
                for _ in 0..count {
                    session.read(&mut buf)?;
                }
                Ok(())
            }));
        }

        let mut merged = Histogram::<u64>::new(3)?;
        for handle in writer_handles {
            let histogram = handle
                .join()
                .map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
            merged.add(&histogram)?;
        }
        for handle in reader_handles {
            handle
                .join()
                .map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
        }
        Ok(merged)
    })?;
    let elapsed = started.elapsed();

    let secs = elapsed.as_secs_f64().max(1e-9);
    let total_bytes = (payload_bytes as f64) * (messages as f64);
    writeln!(
        out,
        "elapsed_ms={} msg_per_sec={:.2} mb_per_sec={:.2}",
        elapsed.as_millis(),
        messages as f64 / secs,
        (total_bytes / (1024.0 * 1024.0)) / secs
    )?;
    writeln!(
        out,
        "write_ns p50={} p99={} p999={} max={}",
        histogram.value_at_quantile(0.50),
        histogram.value_at_quantile(0.99),
        histogram.value_at_quantile(0.999),
        histogram.max()
    )?;
    Ok(())
}
