//! shmpipe-recv: the consumer process.
//!
//! Maps a channel region from an inherited descriptor and drains it to
//! stdout until the producer closes the channel.
//!
//! # Usage
//!
//! ```bash
//! shmpipe-recv <FD>
//! ```

use std::io::Write;
use std::os::fd::{FromRawFd, OwnedFd};

use clap::Parser;
use shmpipe::ShmChannel;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shmpipe-recv")]
#[command(about = "Drain a shared-memory byte channel to stdout")]
struct Args {
    /// Inherited file descriptor of the shared memory region
    fd: i32,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let args = Args::parse();

    // SAFETY: the descriptor number was handed to this process by its
    // spawner and nothing else in this process owns it.
    let fd = unsafe { OwnedFd::from_raw_fd(args.fd) };

    let channel = match ShmChannel::from_fd(fd) {
        Ok(channel) => channel,
        Err(e) => {
            tracing::error!(?e, "failed to map channel region");
            std::process::exit(1);
        }
    };

    tracing::debug!(status = %channel.status(), "channel mapped");

    let mut buf = vec![0u8; channel.capacity()];
    let mut receiver = channel.into_receiver();
    let mut stdout = std::io::stdout().lock();
    let mut total = 0u64;

    loop {
        let n = receiver.recv(&mut buf);
        if n == 0 {
            break;
        }
        total += n as u64;
        stdout
            .write_all(&buf[..n])
            .expect("failed to write to stdout");
    }

    stdout.flush().expect("failed to flush stdout");
    tracing::info!(total, "channel drained, producer closed");
}
