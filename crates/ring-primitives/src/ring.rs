//! SPSC byte ring over a shared memory region.
//!
//! The ring is an undifferentiated byte stream: a producer appends bytes, a
//! consumer drains them, and the two synchronize through a 24-byte control
//! block at the start of the region. Cursors are monotonically increasing
//! 64-bit byte counts, reduced modulo the arena capacity only when indexing
//! into the arena. `head == tail` is therefore exactly empty and
//! `head - tail == capacity` exactly full, with no ambiguity between the two.
//!
//! Payload visibility rides on the cursor atomics alone: the producer's
//! release store of `head` publishes the bytes it covers, and the consumer's
//! acquire load of `head` is what makes them visible before the copy out.
//! The `wake` word never carries data; it exists so a blocked side can park
//! in a kernel wait instead of spinning, and correctness never depends on it.

use core::mem::size_of;
use core::ptr;

use crate::region::Region;
use crate::sync::{AtomicU32, AtomicU64, Ordering};

/// Channel control block (24 bytes), at offset 0 of the shared region.
///
/// This is a wire format interpreted as raw memory by two independently
/// compiled processes: field order, widths and offsets must never change.
#[repr(C)]
pub struct ChannelHeader {
    /// Total bytes ever published (written by producer, read by consumer).
    pub head: AtomicU64,
    /// Total bytes ever consumed (written by consumer, read by producer).
    pub tail: AtomicU64,
    /// Wait/wake word. Incremented by the side that relieves the other
    /// side's blocking condition, immediately before waking it.
    pub wake: AtomicU32,
    /// 0 while the channel is open; nonzero once either side shuts down.
    pub closed: AtomicU32,
}

#[cfg(not(feature = "loom"))]
const _: () = assert!(size_of::<ChannelHeader>() == 24);
#[cfg(not(feature = "loom"))]
const _: () = assert!(core::mem::offset_of!(ChannelHeader, head) == 0);
#[cfg(not(feature = "loom"))]
const _: () = assert!(core::mem::offset_of!(ChannelHeader, tail) == 8);
#[cfg(not(feature = "loom"))]
const _: () = assert!(core::mem::offset_of!(ChannelHeader, wake) == 16);
#[cfg(not(feature = "loom"))]
const _: () = assert!(core::mem::offset_of!(ChannelHeader, closed) == 20);

impl ChannelHeader {
    /// Initialize a new channel header.
    pub fn init(&mut self) {
        self.head = AtomicU64::new(0);
        self.tail = AtomicU64::new(0);
        self.wake = AtomicU32::new(0);
        self.closed = AtomicU32::new(0);
    }

    /// Number of unread bytes currently in the ring.
    #[inline]
    pub fn len(&self) -> u64 {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire) != 0
    }

    /// Mark the channel as shut down. Waking parked peers is the caller's
    /// responsibility.
    pub fn close(&self) {
        self.closed.store(1, Ordering::Release);
    }
}

/// Result of a push attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushResult {
    /// All bytes were published. `was_empty` reports whether the ring held
    /// no unread bytes just before this push; the consumer may be parked and
    /// needs a wake.
    Ok { was_empty: bool },
    /// Not enough free space for the whole payload; nothing was written.
    WouldBlock,
}

impl PushResult {
    #[inline]
    pub fn is_would_block(self) -> bool {
        matches!(self, PushResult::WouldBlock)
    }
}

/// A byte ring addressed through raw pointers.
///
/// Suitable for shared memory where the caller holds `*mut` pointers from
/// mmap and manages the mapping lifetime itself. [`ByteRing`] is the
/// region-based convenience wrapper and delegates here.
pub struct ByteRingRaw {
    header: *mut ChannelHeader,
    arena: *mut u8,
    capacity: usize,
}

// SAFETY: all shared mutation goes through the header atomics; arena bytes
// are only touched on the side that owns them per the cursor protocol.
unsafe impl Send for ByteRingRaw {}
unsafe impl Sync for ByteRingRaw {}

impl ByteRingRaw {
    /// Create a ring view from raw pointers.
    ///
    /// # Safety
    ///
    /// - `header` must point to a valid, initialized `ChannelHeader`.
    /// - `arena` must point to `capacity` bytes of shared memory.
    /// - Both must remain valid for the lifetime of this value.
    pub unsafe fn from_raw(header: *mut ChannelHeader, arena: *mut u8, capacity: usize) -> Self {
        assert!(capacity > 0, "arena capacity must be > 0");
        Self {
            header,
            arena,
            capacity,
        }
    }

    #[inline]
    pub fn header(&self) -> &ChannelHeader {
        // SAFETY: valid per the from_raw contract.
        unsafe { &*self.header }
    }

    /// Arena capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copy `data` into the arena starting at logical position `pos`,
    /// splitting at the arena end when the span wraps.
    ///
    /// # Safety
    ///
    /// The caller must own `[pos, pos + data.len())` per the cursor protocol:
    /// the span lies in free space and `data.len() <= capacity`.
    unsafe fn copy_in(&self, pos: u64, data: &[u8]) {
        let start = (pos % self.capacity as u64) as usize;
        let first = data.len().min(self.capacity - start);
        // SAFETY: start + first <= capacity, and the remainder lands at the
        // arena base; the producer owns both spans.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.arena.add(start), first);
            if first < data.len() {
                ptr::copy_nonoverlapping(data.as_ptr().add(first), self.arena, data.len() - first);
            }
        }
    }

    /// Copy `buf.len()` bytes out of the arena starting at logical position
    /// `pos`, splitting at the arena end when the span wraps.
    ///
    /// # Safety
    ///
    /// The caller must own `[pos, pos + buf.len())` per the cursor protocol:
    /// the span holds published, unread bytes. Must be called only after the
    /// acquire load of `head` that covers them.
    unsafe fn copy_out(&self, pos: u64, buf: &mut [u8]) {
        let start = (pos % self.capacity as u64) as usize;
        let first = buf.len().min(self.capacity - start);
        // SAFETY: start + first <= capacity, remainder wraps to the base;
        // the consumer owns both spans until it advances tail.
        unsafe {
            ptr::copy_nonoverlapping(self.arena.add(start), buf.as_mut_ptr(), first);
            if first < buf.len() {
                ptr::copy_nonoverlapping(self.arena, buf.as_mut_ptr().add(first), buf.len() - first);
            }
        }
    }

    /// Try to publish `data` as one unit (producer side).
    ///
    /// `local_head` is the producer-private cursor; on success it is advanced
    /// and stored to the header with release ordering. A payload longer than
    /// `capacity()` can never fit and always returns `WouldBlock`; callers
    /// reject it up front.
    pub fn try_push(&self, local_head: &mut u64, data: &[u8]) -> PushResult {
        let header = self.header();
        let tail = header.tail.load(Ordering::Acquire);
        let used = local_head.wrapping_sub(tail);
        let free = self.capacity as u64 - used;

        if (data.len() as u64) > free {
            return PushResult::WouldBlock;
        }

        // SAFETY: [local_head, local_head + data.len()) is free space: the
        // consumer never reads past head, and free >= data.len() was checked
        // against an acquire load of tail.
        unsafe { self.copy_in(*local_head, data) };

        let was_empty = used == 0;
        *local_head = local_head.wrapping_add(data.len() as u64);
        header.head.store(*local_head, Ordering::Release);

        PushResult::Ok { was_empty }
    }

    /// Try to drain up to `buf.len()` bytes (consumer side).
    ///
    /// Returns the byte count copied out, or `None` when the ring is empty.
    /// A full drain reads exactly the available byte count; a smaller `buf`
    /// drains a prefix. Every successful drain frees space that may relieve
    /// a blocked producer, whatever the pre-drain occupancy; waking is the
    /// caller's obligation after every advance.
    pub fn try_pop(&self, buf: &mut [u8]) -> Option<usize> {
        let header = self.header();
        let tail = header.tail.load(Ordering::Relaxed);
        let head = header.head.load(Ordering::Acquire);
        let available = head.wrapping_sub(tail);

        if available == 0 || buf.is_empty() {
            return None;
        }

        let len = (buf.len() as u64).min(available) as usize;
        // SAFETY: [tail, tail + len) holds published bytes: len <= available
        // and the acquire load of head above covers them.
        unsafe { self.copy_out(tail, &mut buf[..len]) };

        header.tail.store(tail.wrapping_add(len as u64), Ordering::Release);

        Some(len)
    }
}

/// A byte ring living in a [`Region`], header at offset 0, arena after it.
pub struct ByteRing {
    raw: ByteRingRaw,
}

// SAFETY: same as ByteRingRaw; the region adds no shared state.
unsafe impl Send for ByteRing {}
unsafe impl Sync for ByteRing {}

impl ByteRing {
    fn raw_parts(region: Region) -> ByteRingRaw {
        assert!(
            region.len() > size_of::<ChannelHeader>(),
            "region too small for channel"
        );
        let capacity = region.len() - size_of::<ChannelHeader>();
        // SAFETY: header and arena are disjoint in-bounds spans of the
        // region; validity and lifetime come from the Region contract.
        unsafe {
            ByteRingRaw::from_raw(
                region.offset(0) as *mut ChannelHeader,
                region.offset(size_of::<ChannelHeader>()),
                capacity,
            )
        }
    }

    /// Initialize a new ring in the region.
    ///
    /// # Safety
    ///
    /// The region must be writable and exclusively owned during
    /// initialization.
    pub unsafe fn init(region: Region) -> Self {
        let raw = Self::raw_parts(region);
        // SAFETY: exclusive access during initialization per the contract.
        unsafe { (*raw.header).init() };
        Self { raw }
    }

    /// Attach to an existing ring in the region.
    ///
    /// # Safety
    ///
    /// The region must contain a channel header initialized by a conforming
    /// peer, and both mappings must span the same number of bytes.
    pub unsafe fn attach(region: Region) -> Self {
        Self {
            raw: Self::raw_parts(region),
        }
    }

    #[inline]
    pub fn header(&self) -> &ChannelHeader {
        self.raw.header()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.header().is_empty()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.header().is_closed()
    }

    /// Producer handle. The producer-private cursor is seeded from the
    /// header; `head` has a single writer, so the stored value is always the
    /// producer's own last publish.
    pub fn producer(&self) -> ByteProducer<'_> {
        ByteProducer {
            ring: self,
            local_head: self.header().head.load(Ordering::Acquire),
        }
    }

    /// Consumer handle.
    pub fn consumer(&self) -> ByteConsumer<'_> {
        ByteConsumer { ring: self }
    }

    /// Split into producer and consumer handles.
    pub fn split(&self) -> (ByteProducer<'_>, ByteConsumer<'_>) {
        (self.producer(), self.consumer())
    }

    /// Snapshot of the cursors for diagnostics.
    pub fn status(&self) -> ChannelStatus {
        let header = self.header();
        let head = header.head.load(Ordering::Acquire);
        let tail = header.tail.load(Ordering::Acquire);
        ChannelStatus {
            head,
            tail,
            capacity: self.capacity(),
            len: head.wrapping_sub(tail),
        }
    }
}

/// Producer handle for the ring.
pub struct ByteProducer<'a> {
    ring: &'a ByteRing,
    local_head: u64,
}

impl<'a> ByteProducer<'a> {
    /// Try to publish `data` as one unit. See [`ByteRingRaw::try_push`].
    pub fn try_push(&mut self, data: &[u8]) -> PushResult {
        self.ring.raw.try_push(&mut self.local_head, data)
    }

    /// Free space in bytes, against a fresh acquire load of `tail`.
    #[inline]
    pub fn free_space(&self) -> u64 {
        let tail = self.ring.header().tail.load(Ordering::Acquire);
        self.ring.capacity() as u64 - self.local_head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free_space() == 0
    }
}

/// Consumer handle for the ring.
pub struct ByteConsumer<'a> {
    ring: &'a ByteRing,
}

impl<'a> ByteConsumer<'a> {
    /// Try to drain up to `buf.len()` bytes. See [`ByteRingRaw::try_pop`].
    pub fn try_pop(&mut self, buf: &mut [u8]) -> Option<usize> {
        self.ring.raw.try_pop(buf)
    }

    /// Unread bytes available to drain.
    #[inline]
    pub fn available(&self) -> u64 {
        self.ring.header().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }
}

/// Status snapshot of a channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelStatus {
    pub head: u64,
    pub tail: u64,
    pub capacity: usize,
    pub len: u64,
}

impl core::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "head={} tail={} len={}/{}",
            self.head, self.tail, self.len, self.capacity
        )
    }
}
