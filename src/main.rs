use std::fs::File;
use std::io::Write;
use std::process::ExitCode;

use clap::Parser;
use rangefile::{Handle, Options};

/// Progressively downloads a URL through a range-request-backed cache,
/// reading it start to finish and writing the bytes to a file.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// URL of the resource to fetch. Must support HTTP range requests.
    url: String,

    /// Path to write the downloaded bytes to.
    #[arg(short, long, default_value = "out.bin")]
    output: String,

    /// Bytes per slice in the readiness directory.
    #[arg(long, default_value_t = 1024)]
    slice_size: u64,

    /// Number of slices requested per worker claim.
    #[arg(long, default_value_t = 8)]
    slice_window: usize,

    /// Bytes per on-disk fragment file.
    #[arg(long, default_value_t = 16 * 1024 * 1024)]
    fragment_size: u64,

    /// Maximum number of concurrent range-request workers.
    #[arg(long, default_value_t = 2)]
    max_workers: usize,

    /// Read buffer size, in bytes, per chunk pulled from the cache.
    #[arg(long, default_value_t = 64 * 1024)]
    read_buffer: usize,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(total) => {
            log::info!("wrote {total} bytes to {}", args.output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("rangefile-demo: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> rangefile::Result<u64> {
    let options = Options::new()
        .slice_size(args.slice_size)
        .slice_window(args.slice_window)
        .fragment_size(args.fragment_size)
        .max_workers(args.max_workers);

    let handle = Handle::open_with_options(args.url.as_str(), options)?;
    let mut out = File::create(&args.output)?;

    let mut buf = vec![0u8; args.read_buffer];
    let mut total = 0u64;
    loop {
        let n = handle.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        total += n as u64;
    }

    Ok(total)
}
