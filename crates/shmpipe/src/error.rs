//! Error types.

use std::io;

use crate::layout::LayoutError;

/// Errors from creating or attaching to a channel.
///
/// All of these are fatal for the channel: a failed mapping leaves nothing
/// usable behind, so there are no retry paths.
#[derive(Debug)]
pub enum ChannelError {
    /// memfd/ftruncate/mmap/fstat failure.
    Io(io::Error),
    /// The region cannot hold a channel.
    Layout(LayoutError),
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Layout(e) => write!(f, "layout error: {}", e),
        }
    }
}

impl std::error::Error for ChannelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Layout(e) => Some(e),
        }
    }
}

impl From<LayoutError> for ChannelError {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

/// Errors from the producer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    /// The channel was shut down; no further bytes will be read.
    Closed,
    /// The payload can never fit: it is larger than the arena.
    PayloadTooLarge { len: usize, max: usize },
}

impl std::fmt::Display for SendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "channel is closed"),
            Self::PayloadTooLarge { len, max } => {
                write!(f, "payload too large for arena: {} bytes, max {}", len, max)
            }
        }
    }
}

impl std::error::Error for SendError {}
