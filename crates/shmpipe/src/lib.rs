//! SPSC shared-memory byte channel.
//!
//! One process appends bytes, another drains them, and the data path never
//! enters the kernel: both sides cooperate through a 24-byte atomic control
//! block at the start of a shared mapping, plus a futex on the header's
//! `wake` word for blocking when the channel is empty or full.
//!
//! The lock-free cursor protocol lives in the `ring-primitives` crate; this
//! crate adds the OS integration: anonymous memory files, mapping,
//! attachment from an inherited descriptor, and the blocking
//! [`Sender`]/[`Receiver`] halves.
//!
//! ```no_run
//! use shmpipe::{ChannelConfig, ShmChannel};
//!
//! let channel = ShmChannel::create(ChannelConfig::default())?;
//! let (mut tx, mut rx) = channel.into_split();
//!
//! tx.send(b"hello")?;
//! let mut buf = [0u8; 16];
//! let n = rx.recv(&mut buf);
//! assert_eq!(&buf[..n], b"hello");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod channel;
pub mod error;
pub mod futex;
pub mod layout;

pub use channel::{ChannelConfig, Receiver, Sender, ShmChannel};
pub use error::{ChannelError, SendError};
pub use layout::{DEFAULT_REGION_SIZE, HEADER_SIZE, LayoutError};
pub use ring_primitives::ChannelStatus;
