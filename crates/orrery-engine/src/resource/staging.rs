use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::device::{BufferDesc, BufferHandle, CopyRegion, DeviceError, GraphicsDevice};

/// Result of a partial staging write.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PartialWrite {
    /// Changed elements were written; the render thread flushes only those.
    Written { epoch: u64 },
    /// No staging allocation exists or the change set names elements past the
    /// staged count. Nothing was written; the caller must stage a full snapshot.
    NeedsFull,
}

/// One half of the double buffer.
#[derive(Debug, Default)]
struct Arena {
    buffer: Option<BufferHandle>,
    staged: usize,
    /// Epoch of the last write that landed in this arena.
    epoch: u64,
    /// Elements changed since this content was last flushed.
    dirty: BTreeSet<usize>,
    full_pending: bool,
}

#[derive(Debug, Default)]
struct StagingInner {
    arenas: [Arena; 2],
    /// Arena the producer writes into. The other one is the front.
    back: usize,
    /// The front arena holds the sealed snapshot. When false its allocation
    /// is only kept for reuse.
    front_live: bool,
    /// Epoch the render thread sealed at its last drain.
    sealed: Option<u64>,
    /// Set by `destroy`; later writes are rejected so nothing is allocated
    /// after teardown.
    closed: bool,
}

impl StagingInner {
    #[inline]
    fn front(&self) -> usize {
        1 - self.back
    }

    fn back_arena(&self) -> &Arena {
        &self.arenas[self.back]
    }

    /// Arena the next write must go to. The back arena is written in place
    /// unless it still carries the sealed snapshot; then the write goes to
    /// the other arena and the sealed one becomes the front.
    fn write_target(&self) -> usize {
        let back = self.back_arena();
        if !self.front_live && self.sealed == Some(back.epoch) {
            self.front()
        } else {
            self.back
        }
    }

    fn commit(&mut self, target: usize) {
        if target != self.back {
            self.back = target;
            self.front_live = true;
        }
    }
}

/// Host-visible scratch memory handed from the producer thread to the
/// render thread, double buffered by epoch.
///
/// Producers write under the channel lock and queue the matching task before
/// releasing it (see [`StagingChannel::writer`]). At each drain the render
/// thread seals the epoch it has just drained. A write that would overwrite
/// the sealed snapshot goes to the other arena instead, so the render thread
/// always flushes exactly the content its drained tasks describe, however
/// far the producer has run ahead.
pub struct StagingChannel {
    device: Arc<dyn GraphicsDevice>,
    label: &'static str,
    element_size: usize,
    inner: Mutex<StagingInner>,
}

impl std::fmt::Debug for StagingChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingChannel")
            .field("label", &self.label)
            .field("element_size", &self.element_size)
            .finish_non_exhaustive()
    }
}

impl StagingChannel {
    pub fn new(device: Arc<dyn GraphicsDevice>, label: &'static str, element_size: usize) -> Self {
        Self {
            device,
            label,
            element_size,
            inner: Mutex::new(StagingInner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StagingInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    /// Elements in the latest write. Safe to call from the producer thread.
    pub fn staged_len(&self) -> usize {
        self.lock().back_arena().staged
    }

    pub fn epoch(&self) -> u64 {
        self.lock().back_arena().epoch
    }

    pub fn has_buffer(&self) -> bool {
        self.lock().back_arena().buffer.is_some()
    }

    /// Staging allocations currently held, front and back.
    pub fn allocations(&self) -> usize {
        self.lock().arenas.iter().filter(|a| a.buffer.is_some()).count()
    }

    /// Locks the channel for a sequence of writes. Producers keep the writer
    /// until the matching task is queued.
    pub fn writer(&self) -> StagingWriter<'_> {
        StagingWriter {
            channel: self,
            inner: self.lock(),
        }
    }

    /// Stages a complete snapshot. See [`StagingWriter::write_full`].
    pub fn write_full(
        &self,
        count: usize,
        fill: &mut dyn FnMut(usize, &mut [u8]),
    ) -> Result<u64, DeviceError> {
        self.writer().write_full(count, fill)
    }

    /// Rewrites only the elements named by `indices`. See
    /// [`StagingWriter::write_partial`].
    pub fn write_partial(
        &self,
        indices: &[usize],
        fill: &mut dyn FnMut(usize, &mut [u8]),
    ) -> Result<PartialWrite, DeviceError> {
        self.writer().write_partial(indices, fill)
    }

    /// Locks the channel while the render thread drains the task queue.
    pub fn lock_for_drain(&self) -> DrainLock<'_> {
        DrainLock {
            label: self.label,
            inner: self.lock(),
        }
    }

    /// Locks the arena holding the snapshot written at `epoch` for flushing.
    ///
    /// `None` when neither arena holds that epoch, which only happens when
    /// tasks were applied without sealing their drain.
    pub fn begin_flush(&self, epoch: u64) -> Option<FlushGuard<'_>> {
        let inner = self.lock();
        let front = inner.front();
        let slot = if inner.front_live && inner.arenas[front].epoch == epoch {
            front
        } else if inner.back_arena().epoch == epoch {
            inner.back
        } else {
            log::debug!(
                "{}: no staged snapshot for epoch {epoch} (latest {})",
                self.label,
                inner.back_arena().epoch
            );
            return None;
        };
        Some(FlushGuard {
            channel: self,
            inner,
            slot,
        })
    }

    /// Frees both arenas and rejects further writes. Idempotent.
    pub fn destroy(&self) -> Result<(), DeviceError> {
        let mut inner = self.lock();
        for arena in &mut inner.arenas {
            self.device.destroy_buffer(arena.buffer.take())?;
            arena.staged = 0;
            arena.dirty.clear();
            arena.full_pending = false;
        }
        inner.front_live = false;
        inner.closed = true;
        Ok(())
    }

    /// Makes `arena` hold a `size`-byte allocation. The old allocation is
    /// freed only once the new one exists.
    fn ensure_size(&self, arena: &mut Arena, size: u64) -> Result<BufferHandle, DeviceError> {
        let current = arena.buffer.and_then(|b| self.device.buffer_size(b));
        match (arena.buffer, current) {
            (Some(buffer), Some(current)) if current == size => Ok(buffer),
            _ => {
                let fresh = self
                    .device
                    .create_buffer(&BufferDesc::staging(self.label, size))?;
                let old = arena.buffer.replace(fresh);
                self.device.destroy_buffer(old)?;
                Ok(fresh)
            }
        }
    }
}

fn closed_error(label: &str) -> DeviceError {
    DeviceError::InvalidUsage(format!("{label}: staging channel destroyed"))
}

/// Producer side of a [`StagingChannel`], holding its lock.
pub struct StagingWriter<'a> {
    channel: &'a StagingChannel,
    inner: MutexGuard<'a, StagingInner>,
}

impl StagingWriter<'_> {
    pub fn staged_len(&self) -> usize {
        self.inner.back_arena().staged
    }

    /// Stages a complete snapshot of `count` elements, reallocating when the
    /// size changes. `fill(i, bytes)` writes element `i`. A zero count frees
    /// the allocation.
    ///
    /// Returns the write epoch to carry in the matching task. On failure the
    /// previous snapshot stays current.
    pub fn write_full(
        &mut self,
        count: usize,
        fill: &mut dyn FnMut(usize, &mut [u8]),
    ) -> Result<u64, DeviceError> {
        let channel = self.channel;
        let inner = &mut *self.inner;
        if inner.closed {
            return Err(closed_error(channel.label));
        }
        let es = channel.element_size;
        let epoch = inner.back_arena().epoch + 1;
        let target = inner.write_target();
        let arena = &mut inner.arenas[target];

        if count == 0 {
            channel.device.destroy_buffer(arena.buffer.take())?;
        } else {
            let size = (count * es) as u64;
            let buffer = channel.ensure_size(arena, size)?;
            channel
                .device
                .map_memory(buffer, 0, size, &mut |bytes: &mut [u8]| {
                    for (i, chunk) in bytes.chunks_exact_mut(es).enumerate() {
                        fill(i, chunk);
                    }
                })?;
        }

        arena.staged = count;
        arena.dirty.clear();
        arena.full_pending = true;
        arena.epoch = epoch;
        inner.commit(target);
        Ok(epoch)
    }

    /// Rewrites only the elements named by `indices`.
    ///
    /// When the latest content is sealed, it is first copied into the other
    /// arena and the change lands there.
    pub fn write_partial(
        &mut self,
        indices: &[usize],
        fill: &mut dyn FnMut(usize, &mut [u8]),
    ) -> Result<PartialWrite, DeviceError> {
        let channel = self.channel;
        let inner = &mut *self.inner;
        if inner.closed {
            return Err(closed_error(channel.label));
        }
        let back = inner.back_arena();
        let Some(source) = back.buffer else {
            return Ok(PartialWrite::NeedsFull);
        };
        let staged = back.staged;
        if indices.iter().any(|i| *i >= staged) {
            return Ok(PartialWrite::NeedsFull);
        }

        let es = channel.element_size as u64;
        let epoch = back.epoch + 1;
        let target = inner.write_target();
        let arena = &mut inner.arenas[target];
        let buffer = if target == inner.back {
            source
        } else {
            let size = staged as u64 * es;
            let buffer = channel.ensure_size(arena, size)?;
            copy_host(channel.device.as_ref(), source, buffer, size)?;
            arena.staged = staged;
            arena.dirty.clear();
            arena.full_pending = false;
            buffer
        };

        for &i in indices {
            channel
                .device
                .map_memory(buffer, i as u64 * es, es, &mut |bytes: &mut [u8]| fill(i, bytes))?;
            arena.dirty.insert(i);
        }
        arena.epoch = epoch;
        inner.commit(target);
        Ok(PartialWrite::Written { epoch })
    }
}

/// Copies `size` bytes between two host-visible buffers.
fn copy_host(
    device: &dyn GraphicsDevice,
    src: BufferHandle,
    dst: BufferHandle,
    size: u64,
) -> Result<(), DeviceError> {
    let mut bytes = Vec::with_capacity(size as usize);
    device.map_memory(src, 0, size, &mut |mapped: &mut [u8]| {
        bytes.extend_from_slice(mapped)
    })?;
    device.map_memory(dst, 0, size, &mut |mapped: &mut [u8]| {
        mapped.copy_from_slice(&bytes)
    })
}

/// Render-thread lock held across a task-queue drain.
pub struct DrainLock<'a> {
    label: &'static str,
    inner: MutexGuard<'a, StagingInner>,
}

impl DrainLock<'_> {
    /// Seals the latest write and releases the lock. Returns the sealed epoch.
    ///
    /// Every task for the channel is queued before its lock is released, so
    /// with the lock held the latest write is exactly the newest drained one.
    /// An older front snapshot is retired; its unflushed changes carry over
    /// to the back arena and its allocation is kept for reuse.
    pub fn seal(mut self) -> u64 {
        let inner = &mut *self.inner;
        let epoch = inner.back_arena().epoch;
        if inner.front_live && inner.sealed != Some(epoch) {
            let (front, back) = match inner.back {
                0 => {
                    let [back, front] = &mut inner.arenas;
                    (front, back)
                }
                _ => {
                    let [front, back] = &mut inner.arenas;
                    (front, back)
                }
            };
            back.dirty.append(&mut front.dirty);
            back.full_pending |= std::mem::take(&mut front.full_pending);
            inner.front_live = false;
            log::trace!("{}: retired front arena at epoch {}", self.label, front.epoch);
        }
        inner.sealed = Some(epoch);
        epoch
    }
}

/// Render-thread side of a [`StagingChannel`], holding its lock on the
/// arena that matches the drained epoch.
pub struct FlushGuard<'a> {
    channel: &'a StagingChannel,
    inner: MutexGuard<'a, StagingInner>,
    slot: usize,
}

impl FlushGuard<'_> {
    fn arena(&self) -> &Arena {
        &self.inner.arenas[self.slot]
    }

    pub fn epoch(&self) -> u64 {
        self.arena().epoch
    }

    pub fn staged_len(&self) -> usize {
        self.arena().staged
    }

    /// Staged bytes.
    pub fn staged_size(&self) -> u64 {
        (self.arena().staged * self.channel.element_size) as u64
    }

    pub fn has_pending(&self) -> bool {
        let arena = self.arena();
        arena.full_pending || !arena.dirty.is_empty()
    }

    /// Dirty elements coalesced into contiguous copy regions.
    pub fn dirty_regions(&self) -> Vec<CopyRegion> {
        let es = self.channel.element_size as u64;
        let mut regions: Vec<CopyRegion> = Vec::new();
        for &i in &self.arena().dirty {
            let offset = i as u64 * es;
            match regions.last_mut() {
                Some(last) if last.src_offset + last.size == offset => last.size += es,
                _ => regions.push(CopyRegion::aligned(offset, es)),
            }
        }
        regions
    }

    /// Copies the whole snapshot into every target.
    pub fn flush_full(&mut self, targets: &[BufferHandle]) -> Result<u64, DeviceError> {
        let size = self.staged_size();
        if let (Some(src), true) = (self.arena().buffer, size > 0) {
            for dst in targets {
                self.channel
                    .device
                    .copy_buffer(*dst, src, &[CopyRegion::whole(size)])?;
            }
        }
        let arena = &mut self.inner.arenas[self.slot];
        arena.dirty.clear();
        arena.full_pending = false;
        Ok(size)
    }

    /// Copies only the dirty elements into every target. Falls back to a
    /// full copy when a full snapshot is still pending.
    pub fn flush_dirty(&mut self, targets: &[BufferHandle]) -> Result<u64, DeviceError> {
        if self.arena().full_pending {
            return self.flush_full(targets);
        }
        let regions = self.dirty_regions();
        let bytes: u64 = regions.iter().map(|r| r.size).sum();
        if let (Some(src), false) = (self.arena().buffer, regions.is_empty()) {
            for dst in targets {
                self.channel.device.copy_buffer(*dst, src, &regions)?;
            }
        }
        self.inner.arenas[self.slot].dirty.clear();
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceCall, RecordingDevice};

    fn channel(device: &Arc<RecordingDevice>) -> StagingChannel {
        StagingChannel::new(device.clone(), "test staging", 4)
    }

    fn fill_with(value: u8) -> impl FnMut(usize, &mut [u8]) {
        move |i, bytes| bytes.fill(value + i as u8)
    }

    // ── writes ────────────────────────────────────────────────────────────

    #[test]
    fn full_write_allocates_once_per_size() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);

        staging.write_full(4, &mut fill_with(0)).unwrap();
        staging.write_full(4, &mut fill_with(10)).unwrap();
        assert_eq!(device.live_buffers(), 1);

        staging.write_full(8, &mut fill_with(0)).unwrap();
        assert_eq!(device.live_buffers(), 1);
        assert_eq!(staging.staged_len(), 8);
    }

    #[test]
    fn zero_count_frees_staging() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        staging.write_full(4, &mut fill_with(0)).unwrap();
        staging.write_full(0, &mut fill_with(0)).unwrap();
        assert!(!staging.has_buffer());
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn partial_without_staging_needs_full() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        assert_eq!(
            staging.write_partial(&[0], &mut fill_with(0)).unwrap(),
            PartialWrite::NeedsFull
        );
    }

    #[test]
    fn partial_past_staged_count_needs_full() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        staging.write_full(4, &mut fill_with(0)).unwrap();
        assert_eq!(
            staging.write_partial(&[4], &mut fill_with(0)).unwrap(),
            PartialWrite::NeedsFull
        );
    }

    #[test]
    fn failed_realloc_keeps_previous_snapshot() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        let epoch = staging.write_full(2, &mut fill_with(0)).unwrap();

        device.fail_next_buffer_allocs(1);
        assert!(staging.write_full(3, &mut fill_with(0)).is_err());
        assert_eq!(staging.staged_len(), 2);
        assert_eq!(staging.epoch(), epoch);
    }

    // ── flush ─────────────────────────────────────────────────────────────

    #[test]
    fn dirty_regions_coalesce() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        let mut epoch = staging.write_full(10, &mut fill_with(0)).unwrap();
        {
            let mut guard = staging.begin_flush(epoch).unwrap();
            guard.flush_full(&[]).unwrap();
        }
        if let PartialWrite::Written { epoch: e } =
            staging.write_partial(&[2, 3, 7], &mut fill_with(50)).unwrap()
        {
            epoch = e;
        }

        let guard = staging.begin_flush(epoch).unwrap();
        assert_eq!(
            guard.dirty_regions(),
            vec![CopyRegion::aligned(8, 8), CopyRegion::aligned(28, 4)]
        );
    }

    #[test]
    fn flush_waits_for_drained_epoch() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        let epoch = staging.write_full(2, &mut fill_with(0)).unwrap();
        assert!(staging.begin_flush(epoch - 1).is_none());
        assert!(staging.begin_flush(epoch).is_some());
    }

    #[test]
    fn flush_dirty_copies_only_changed_bytes() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        let dst = device
            .create_buffer(&BufferDesc::device_local("dst", 16, wgpu::BufferUsages::VERTEX))
            .unwrap();

        let epoch = staging.write_full(4, &mut fill_with(0)).unwrap();
        staging.begin_flush(epoch).unwrap().flush_full(&[dst]).unwrap();

        let PartialWrite::Written { epoch } =
            staging.write_partial(&[1], &mut fill_with(100)).unwrap()
        else {
            panic!("expected partial write");
        };
        device.clear_calls();
        let copied = staging.begin_flush(epoch).unwrap().flush_dirty(&[dst]).unwrap();

        assert_eq!(copied, 4);
        assert!(matches!(
            device.calls().as_slice(),
            [DeviceCall::CopyBuffer { regions, .. }] if regions == &[CopyRegion::aligned(4, 4)]
        ));
        assert_eq!(
            device.read_buffer(dst).unwrap(),
            vec![0, 0, 0, 0, 101, 101, 101, 101, 2, 2, 2, 2, 3, 3, 3, 3]
        );
    }

    // ── double buffering ──────────────────────────────────────────────────

    fn partial(staging: &StagingChannel, index: usize, value: u8) -> u64 {
        match staging.write_partial(&[index], &mut fill_with(value)).unwrap() {
            PartialWrite::Written { epoch } => epoch,
            PartialWrite::NeedsFull => panic!("expected partial write"),
        }
    }

    fn target(device: &Arc<RecordingDevice>) -> BufferHandle {
        device
            .create_buffer(&BufferDesc::device_local("dst", 16, wgpu::BufferUsages::VERTEX))
            .unwrap()
    }

    #[test]
    fn writes_after_seal_keep_the_sealed_snapshot() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        let dst = target(&device);

        let first = staging.write_full(4, &mut fill_with(0)).unwrap();
        assert_eq!(staging.lock_for_drain().seal(), first);
        let second = partial(&staging, 1, 100);
        assert_eq!(staging.allocations(), 2);
        assert_eq!(staging.epoch(), second);

        staging.begin_flush(first).unwrap().flush_dirty(&[dst]).unwrap();
        assert_eq!(
            device.read_buffer(dst).unwrap(),
            vec![0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]
        );

        assert_eq!(staging.lock_for_drain().seal(), second);
        device.clear_calls();
        staging.begin_flush(second).unwrap().flush_dirty(&[dst]).unwrap();
        assert!(matches!(
            device.calls().as_slice(),
            [DeviceCall::CopyBuffer { regions, .. }] if regions == &[CopyRegion::aligned(4, 4)]
        ));
        assert_eq!(
            device.read_buffer(dst).unwrap(),
            vec![0, 0, 0, 0, 101, 101, 101, 101, 2, 2, 2, 2, 3, 3, 3, 3]
        );
    }

    #[test]
    fn unflushed_front_carries_over_at_next_seal() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        let dst = target(&device);

        staging.write_full(4, &mut fill_with(0)).unwrap();
        staging.lock_for_drain().seal();
        let second = partial(&staging, 1, 100);
        // The first snapshot was never flushed, so the second one must be
        // copied whole.
        staging.lock_for_drain().seal();

        device.clear_calls();
        let mut flush = staging.begin_flush(second).unwrap();
        assert!(flush.has_pending());
        assert_eq!(flush.flush_dirty(&[dst]).unwrap(), 16);
        drop(flush);
        assert!(matches!(
            device.calls().as_slice(),
            [DeviceCall::CopyBuffer { regions, .. }] if regions == &[CopyRegion::whole(16)]
        ));
    }

    #[test]
    fn retired_arena_is_reused() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        staging.write_full(4, &mut fill_with(0)).unwrap();
        staging.lock_for_drain().seal();
        partial(&staging, 1, 10);
        staging.lock_for_drain().seal();

        device.clear_calls();
        let third = partial(&staging, 2, 20);
        assert!(!device
            .calls()
            .iter()
            .any(|c| matches!(c, DeviceCall::CreateBuffer { .. })));
        assert_eq!(device.live_buffers(), 2);
        assert!(staging.begin_flush(third).is_some());
    }

    #[test]
    fn writes_between_seals_stay_in_place() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        let first = staging.write_full(4, &mut fill_with(0)).unwrap();
        staging.lock_for_drain().seal();
        partial(&staging, 1, 10);
        let third = partial(&staging, 3, 30);

        assert_eq!(staging.allocations(), 2);
        assert!(staging.begin_flush(first).is_some());
        let flush = staging.begin_flush(third).unwrap();
        assert_eq!(
            flush.dirty_regions(),
            vec![CopyRegion::aligned(4, 4), CopyRegion::aligned(12, 4)]
        );
    }

    #[test]
    fn destroy_is_idempotent() {
        let device = Arc::new(RecordingDevice::new());
        let staging = channel(&device);
        staging.write_full(1, &mut fill_with(0)).unwrap();
        staging.lock_for_drain().seal();
        staging.write_full(2, &mut fill_with(0)).unwrap();
        assert_eq!(staging.allocations(), 2);

        staging.destroy().unwrap();
        staging.destroy().unwrap();
        assert_eq!(device.live_buffers(), 0);
        assert!(staging.write_full(1, &mut fill_with(0)).is_err());
        assert_eq!(device.live_buffers(), 0);
    }
}
