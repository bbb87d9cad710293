//! Channel creation, attachment and the blocking producer/consumer halves.
//!
//! A channel is one shared mapping: the 24-byte control block at offset 0
//! and a circular byte arena after it. The creating process allocates an
//! anonymous memory file, sizes it, maps it and initializes the header; the
//! peer process inherits the descriptor, maps the same file and attaches.
//! [`Sender`] and [`Receiver`] wrap the lock-free ring from
//! `ring-primitives` with the futex handshake: a side whose condition holds
//! parks on the header's `wake` word, and every cursor advance that can
//! relieve the other side's blocking condition bumps the word and wakes it.

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::Ordering;

use ring_primitives::{ByteRing, ChannelStatus, PushResult, Region};

use crate::error::{ChannelError, SendError};
use crate::futex;
use crate::layout;

/// Configuration for creating a channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Total region size in bytes (header + arena). Must be identical in
    /// both processes' mappings; the attaching side learns it from the
    /// descriptor.
    pub region_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            region_size: layout::DEFAULT_REGION_SIZE,
        }
    }
}

/// The shared mapping.
struct ChannelMapping {
    /// Base address of the mapping.
    base_addr: *mut u8,
    /// Size of the mapping.
    size: usize,
    /// The backing descriptor (kept open for the mapping's lifetime and for
    /// handing to a spawned peer).
    file: File,
}

// SAFETY: ChannelMapping is Send + Sync because the memory it points at is
// only mutated through the header atomics and the cursor-owned arena spans.
unsafe impl Send for ChannelMapping {}
unsafe impl Sync for ChannelMapping {}

impl Drop for ChannelMapping {
    fn drop(&mut self) {
        // SAFETY: base_addr and size were valid when created.
        unsafe {
            libc::munmap(self.base_addr as *mut libc::c_void, self.size);
        }
    }
}

fn map_region(file: &File, size: usize) -> Result<*mut u8, ChannelError> {
    // SAFETY: size is validated nonzero and fd refers to a mappable file of
    // at least that size.
    let base_addr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if base_addr == libc::MAP_FAILED {
        return Err(ChannelError::Io(io::Error::last_os_error()));
    }
    Ok(base_addr as *mut u8)
}

struct ChannelInner {
    ring: ByteRing,
    mapping: ChannelMapping,
}

impl ChannelInner {
    /// Shut the channel down and release every parked waiter.
    fn close(&self) {
        if !self.ring.is_closed() {
            tracing::debug!(status = %self.ring.status(), "closing channel");
            self.ring.header().close();
        }
        futex::futex_signal_all(&self.ring.header().wake);
    }
}

/// An SPSC byte channel over one shared memory mapping.
pub struct ShmChannel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for ShmChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShmChannel").finish_non_exhaustive()
    }
}

impl ShmChannel {
    /// Create a new channel backed by an anonymous memory file.
    ///
    /// The descriptor is created without `MFD_CLOEXEC` so a spawned peer can
    /// inherit it and attach with [`ShmChannel::from_fd`].
    #[cfg(target_os = "linux")]
    pub fn create(config: ChannelConfig) -> Result<Self, ChannelError> {
        layout::validate_region(config.region_size)?;

        // SAFETY: name is a valid C string; the flags request no special
        // sealing behavior.
        let fd = unsafe { libc::memfd_create(c"shmpipe".as_ptr(), 0) };
        if fd < 0 {
            return Err(ChannelError::Io(io::Error::last_os_error()));
        }
        // SAFETY: fd is a fresh descriptor owned by nothing else.
        let file = unsafe { File::from_raw_fd(fd) };
        file.set_len(config.region_size as u64)
            .map_err(ChannelError::Io)?;

        let base_addr = map_region(&file, config.region_size)?;
        // SAFETY: the mapping spans region_size writable shared bytes and
        // stays alive as long as ChannelMapping.
        let region = unsafe { Region::from_raw(base_addr, config.region_size) };
        // SAFETY: freshly mapped, zero-filled memory; no peer can hold the
        // descriptor yet, so initialization is exclusive.
        let ring = unsafe { ByteRing::init(region) };

        tracing::debug!(
            region_size = config.region_size,
            capacity = ring.capacity(),
            "created channel"
        );

        Ok(Self {
            inner: Arc::new(ChannelInner {
                ring,
                mapping: ChannelMapping {
                    base_addr,
                    size: config.region_size,
                    file,
                },
            }),
        })
    }

    /// Attach to a channel created by a peer, from an inherited descriptor.
    ///
    /// The region size is read back from the descriptor; both mappings must
    /// span the same file, so this recovers the size the creator chose.
    pub fn from_fd(fd: OwnedFd) -> Result<Self, ChannelError> {
        let file = File::from(fd);
        let size = file.metadata().map_err(ChannelError::Io)?.len() as usize;
        layout::validate_region(size)?;

        let base_addr = map_region(&file, size)?;
        // SAFETY: the mapping spans size writable shared bytes and stays
        // alive as long as ChannelMapping.
        let region = unsafe { Region::from_raw(base_addr, size) };
        // SAFETY: the creating process initialized the header before
        // sharing the descriptor.
        let ring = unsafe { ByteRing::attach(region) };

        tracing::debug!(region_size = size, "attached to channel");

        Ok(Self {
            inner: Arc::new(ChannelInner {
                ring,
                mapping: ChannelMapping {
                    base_addr,
                    size,
                    file,
                },
            }),
        })
    }

    /// Arena capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.inner.ring.capacity()
    }

    /// Raw descriptor of the backing file, for handing to a spawned peer.
    pub fn raw_fd(&self) -> RawFd {
        self.inner.mapping.file.as_raw_fd()
    }

    /// Snapshot of the cursors for diagnostics.
    pub fn status(&self) -> ChannelStatus {
        self.inner.ring.status()
    }

    /// Split into the two halves, for single-process (two thread) use.
    pub fn into_split(self) -> (Sender, Receiver) {
        (
            Sender {
                inner: self.inner.clone(),
            },
            Receiver { inner: self.inner },
        )
    }

    /// Keep only the producer half (the consumer runs in a peer process).
    pub fn into_sender(self) -> Sender {
        Sender { inner: self.inner }
    }

    /// Keep only the consumer half (the producer runs in a peer process).
    pub fn into_receiver(self) -> Receiver {
        Receiver { inner: self.inner }
    }
}

/// The producer half. Exactly one exists per channel per process; methods
/// take `&mut self`, so the single-writer discipline on `head` holds by
/// construction.
pub struct Sender {
    inner: Arc<ChannelInner>,
}

impl Sender {
    /// Publish `data` as one unit, blocking while the arena lacks space.
    pub fn send(&mut self, data: &[u8]) -> Result<(), SendError> {
        let ring = &self.inner.ring;
        if data.len() > ring.capacity() {
            return Err(SendError::PayloadTooLarge {
                len: data.len(),
                max: ring.capacity(),
            });
        }

        loop {
            // Sample the wake word before re-checking the condition: a drain
            // landing between the check and the wait must make the wait fall
            // through its value test instead of parking us.
            let observed = ring.header().wake.load(Ordering::Acquire);
            if ring.is_closed() {
                return Err(SendError::Closed);
            }
            match ring.producer().try_push(data) {
                PushResult::Ok { was_empty } => {
                    if was_empty {
                        futex::futex_signal(&ring.header().wake);
                    }
                    return Ok(());
                }
                PushResult::WouldBlock => {
                    tracing::trace!(len = data.len(), "arena full, waiting for space");
                    futex::futex_wait(&ring.header().wake, observed);
                }
            }
        }
    }

    /// Publish `data` if it fits right now. Returns `Ok(false)` when the
    /// arena lacks space.
    pub fn try_send(&mut self, data: &[u8]) -> Result<bool, SendError> {
        let ring = &self.inner.ring;
        if data.len() > ring.capacity() {
            return Err(SendError::PayloadTooLarge {
                len: data.len(),
                max: ring.capacity(),
            });
        }
        if ring.is_closed() {
            return Err(SendError::Closed);
        }
        match ring.producer().try_push(data) {
            PushResult::Ok { was_empty } => {
                if was_empty {
                    futex::futex_signal(&ring.header().wake);
                }
                Ok(true)
            }
            PushResult::WouldBlock => Ok(false),
        }
    }

    /// Shut the channel down. The consumer drains what remains, then sees
    /// end-of-stream.
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.ring.is_closed()
    }

    /// Snapshot of the cursors for diagnostics.
    pub fn status(&self) -> ChannelStatus {
        self.inner.ring.status()
    }
}

impl Drop for Sender {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// The consumer half. Exactly one exists per channel per process; methods
/// take `&mut self`, so the single-writer discipline on `tail` holds by
/// construction.
pub struct Receiver {
    inner: Arc<ChannelInner>,
}

impl Receiver {
    /// Drain up to `buf.len()` bytes, blocking while the channel is empty.
    ///
    /// Returns 0 only once the channel is closed and fully drained
    /// (end-of-stream), or when `buf` is empty.
    pub fn recv(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let ring = &self.inner.ring;

        loop {
            // Same sampling discipline as the send loop: word first, then
            // the condition re-check, then the wait.
            let observed = ring.header().wake.load(Ordering::Acquire);
            if let Some(n) = ring.consumer().try_pop(buf) {
                // Every drain frees space that may relieve a parked
                // producer; which write sizes are pending is unknowable
                // here, so every advance signals.
                futex::futex_signal(&ring.header().wake);
                return n;
            }
            if ring.is_closed() {
                return 0;
            }
            tracing::trace!("arena empty, waiting for data");
            futex::futex_wait(&ring.header().wake, observed);
        }
    }

    /// Drain up to `buf.len()` bytes if any are available right now.
    pub fn try_recv(&mut self, buf: &mut [u8]) -> Option<usize> {
        let ring = &self.inner.ring;
        let n = ring.consumer().try_pop(buf)?;
        futex::futex_signal(&ring.header().wake);
        Some(n)
    }

    /// Shut the channel down. A blocked producer wakes with
    /// [`SendError::Closed`].
    pub fn close(&mut self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.ring.is_closed()
    }

    /// Snapshot of the cursors for diagnostics.
    pub fn status(&self) -> ChannelStatus {
        self.inner.ring.status()
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.inner.close();
    }
}
