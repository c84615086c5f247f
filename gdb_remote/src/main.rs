use std::num::ParseIntError;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use gdb_remote::{config::DEFAULT_PORT, FlatTarget, GdbStub, SessionState, StubConfig};

/// Serves a flat memory CPU model to GDB over TCP.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TCP port to listen on (loopback only)
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Hold the CPU until a debugger attaches
    #[arg(long)]
    wait: bool,

    /// Drop the debugger after this many corrupt packets in a row
    #[arg(long)]
    max_retries: Option<usize>,

    /// Raw binary loaded at the load address
    #[arg(long)]
    image: Option<PathBuf>,

    /// Start of RAM and initial program counter
    #[arg(long, value_parser = parse_address, default_value = "0")]
    load_address: u64,

    /// RAM size in bytes
    #[arg(long, value_parser = parse_address, default_value = "0x100000")]
    memory_size: u64,

    /// Instructions executed between polls of the debugger
    #[arg(long, default_value_t = 0x1000)]
    budget: usize,

    #[arg(long, default_value_t = log::LevelFilter::Info)]
    log_level: log::LevelFilter,
}

fn parse_address(text: &str) -> Result<u64, ParseIntError> {
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    }
}

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

fn main() {
    let args = Args::parse();
    _ = log::set_logger(&Logger);
    log::set_max_level(args.log_level);

    if let Err(err) = run(args) {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut target = FlatTarget::new(args.load_address, usize::try_from(args.memory_size)?);
    if let Some(path) = &args.image {
        let image = std::fs::read(path)?;
        target.load_image(args.load_address, &image)?;
        log::info!(
            "loaded {} bytes from {} at {:#x}",
            image.len(),
            path.display(),
            args.load_address
        );
    }

    let cfg = StubConfig {
        port: args.port,
        max_checksum_retries: args.max_retries,
    };
    let mut stub = GdbStub::bind(target, cfg)?;
    log::info!("waiting for gdb on {}", stub.local_addr()?);

    stub.run(args.wait)?;
    loop {
        // the CPU only halts while the debugger holds it stopped
        match stub.state() {
            SessionState::Disconnected | SessionState::StopReply => {
                if let Some(addr) = stub.target_mut().run(args.budget) {
                    log::debug!("stopped at {:#x}", addr);
                }
            }
            SessionState::WaitingForCommand => {}
        }
        stub.run(false)?;
        if stub.state() == SessionState::Disconnected {
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}
