//! shmpipe-send: the producer process.
//!
//! Maps a channel region from an inherited descriptor and streams stdin
//! into it, closing the channel at end of input.
//!
//! # Usage
//!
//! ```bash
//! shmpipe-send <FD> < payload
//! ```

use std::io::Read;
use std::os::fd::{FromRawFd, OwnedFd};

use clap::Parser;
use shmpipe::ShmChannel;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shmpipe-send")]
#[command(about = "Stream stdin into a shared-memory byte channel")]
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

    // Chunk at the arena size so every chunk can fit once space frees up.
    let mut buf = vec![0u8; channel.capacity()];
    let mut sender = channel.into_sender();
    let mut stdin = std::io::stdin().lock();
    let mut total = 0u64;

    loop {
        let n = stdin.read(&mut buf).expect("failed to read from stdin");
        if n == 0 {
            break;
        }
        if let Err(e) = sender.send(&buf[..n]) {
            tracing::error!(%e, "consumer went away");
            std::process::exit(1);
        }
        total += n as u64;
    }

    tracing::info!(total, "input exhausted, closing channel");
    // Dropping the sender marks the channel closed and wakes the consumer.
}
