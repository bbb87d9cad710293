//! Lock-free SPSC byte ring for shared memory channels.
//!
//! This crate provides the `no_std`-compatible core of a
//! single-producer/single-consumer byte-stream channel over a fixed-size
//! shared memory region: the control-block layout, the wraparound
//! read/write algorithm, and the memory-ordering contract. It knows nothing
//! about how the region is created or how a blocked side parks; the OS
//! integration (memfd, mmap, futex) lives in the `shmpipe` crate.
//!
//! # Primitives
//!
//! - [`ByteRing`] / [`ByteRingRaw`]: the ring itself, split into
//!   [`ByteProducer`] and [`ByteConsumer`] handles
//! - [`ChannelHeader`]: the 24-byte control block both processes agree on
//!
//! # Raw vs Region APIs
//!
//! - **Raw** (`ByteRingRaw`): works with raw pointers, suitable for shared
//!   memory where you have `*mut` pointers from mmap. Caller manages memory
//!   lifetime.
//! - **Region** (`ByteRing`): convenience wrapper over a [`Region`] with the
//!   header at offset 0. Delegates to the Raw implementation internally.
//!
//! # Loom Testing
//!
//! Enable the `loom` feature for concurrency verification of the cursor
//! protocol across all interleavings:
//!
//! ```text
//! cargo test -p ring-primitives --features loom
//! ```

#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;
#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod region;
pub mod ring;
pub mod sync;

#[cfg(any(test, feature = "alloc"))]
pub use region::HeapRegion;
pub use region::Region;
pub use ring::{
    ByteConsumer, ByteProducer, ByteRing, ByteRingRaw, ChannelHeader, ChannelStatus, PushResult,
};
