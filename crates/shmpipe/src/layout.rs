//! Shared region layout contract.
//!
//! Both processes interpret the mapped region as raw memory, so the layout
//! is a fixed wire format: any disagreement about field offsets or widths is
//! a silent correctness bug, not a runtime error. The offsets are pinned at
//! compile time here.
//!
//! # Region Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Channel header (24 bytes)                               │
//! │    head   u64  @ 0   bytes ever published (producer)     │
//! │    tail   u64  @ 8   bytes ever consumed (consumer)      │
//! │    wake   u32  @ 16  futex word                          │
//! │    closed u32  @ 20  0 = open, nonzero = shutting down   │
//! ├──────────────────────────────────────────────────────────┤
//! │  Arena (region size − 24 bytes, circular byte buffer)    │
//! └──────────────────────────────────────────────────────────┘
//! ```

use core::mem::{offset_of, size_of};

use ring_primitives::ChannelHeader;
use static_assertions::const_assert_eq;

/// Size of the control block at the start of the region.
pub const HEADER_SIZE: usize = 24;

/// Reference region size: one page, yielding a 4072-byte arena.
pub const DEFAULT_REGION_SIZE: usize = 4096;

/// Smallest usable region: the header plus a one-byte arena.
pub const MIN_REGION_SIZE: usize = HEADER_SIZE + 1;

const_assert_eq!(size_of::<ChannelHeader>(), HEADER_SIZE);
const_assert_eq!(offset_of!(ChannelHeader, head), 0);
const_assert_eq!(offset_of!(ChannelHeader, tail), 8);
const_assert_eq!(offset_of!(ChannelHeader, wake), 16);
const_assert_eq!(offset_of!(ChannelHeader, closed), 20);

/// Arena capacity for a region of `region_len` bytes.
///
/// Callers validate `region_len` with [`validate_region`] first.
#[inline]
pub fn arena_capacity(region_len: usize) -> usize {
    region_len - HEADER_SIZE
}

/// Check that a region of `len` bytes can hold a channel.
pub fn validate_region(len: usize) -> Result<(), LayoutError> {
    if len < MIN_REGION_SIZE {
        return Err(LayoutError::RegionTooSmall {
            required: MIN_REGION_SIZE,
            found: len,
        });
    }
    Ok(())
}

/// Errors from layout validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Region too small for the header plus a non-empty arena.
    RegionTooSmall { required: usize, found: usize },
}

impl std::fmt::Display for LayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegionTooSmall { required, found } => {
                write!(f, "region too small: need {} bytes, got {}", required, found)
            }
        }
    }
}

impl std::error::Error for LayoutError {}
