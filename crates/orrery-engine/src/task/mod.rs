//! Producer-to-render-thread task queue.
//!
//! Producer work (snapshotting, staging writes) runs on the producer thread
//! inside [`TaskSender::enqueue`]. What crosses the channel is only the small
//! [`RenderUpdate`] describing which flags to raise. The render thread drains
//! the queue once per frame in enqueue order; each [`PendingTask`] is consumed
//! by value, so it cannot be applied twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::error::{RenderError, RenderResult};

/// Scene-unique renderable identifier.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct RenderableId(pub(crate) u32);

impl RenderableId {
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for RenderableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Render-thread mutation decided by a producer task.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderUpdate {
    /// A full vertex snapshot of `count` elements is staged.
    RebuildVertices { count: u32, epoch: u64 },
    /// Changed elements of the current snapshot are staged.
    UpdateVertices { count: u32, epoch: u64 },
    /// New model-view matrix for the uniform data.
    ModelView(glam::Mat4),
}

impl RenderUpdate {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RebuildVertices { .. } => "rebuild vertices",
            Self::UpdateVertices { .. } => "update vertices",
            Self::ModelView(_) => "model view",
        }
    }
}

/// One queued task.
#[derive(Debug, PartialEq)]
pub struct PendingTask {
    pub target: RenderableId,
    pub update: RenderUpdate,
    /// Global enqueue order.
    pub seq: u64,
}

/// Cloneable producer end of the task queue.
#[derive(Debug, Clone)]
pub struct TaskSender {
    tx: Sender<PendingTask>,
    seq: Arc<AtomicU64>,
}

impl TaskSender {
    /// Runs `work` on the calling thread and queues the update it returns.
    ///
    /// A failing `work` queues nothing.
    pub fn enqueue<F>(&self, target: RenderableId, work: F) -> RenderResult<()>
    where
        F: FnOnce() -> RenderResult<RenderUpdate>,
    {
        let update = work()?;
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        log::trace!("enqueue task {seq} for {target}: {}", update.name());
        self.tx
            .send(PendingTask {
                target,
                update,
                seq,
            })
            .map_err(|_| RenderError::TaskQueueClosed)
    }
}

/// Render-thread end of the task queue.
#[derive(Debug)]
pub struct TaskQueue {
    rx: Receiver<PendingTask>,
}

impl TaskQueue {
    /// Everything enqueued before this call, in enqueue order.
    pub fn drain(&self) -> Vec<PendingTask> {
        self.rx.try_iter().collect()
    }
}

pub fn task_queue() -> (TaskSender, TaskQueue) {
    let (tx, rx) = mpsc::channel();
    (
        TaskSender {
            tx,
            seq: Arc::new(AtomicU64::new(0)),
        },
        TaskQueue { rx },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceError;

    const A: RenderableId = RenderableId(1);

    #[test]
    fn drain_preserves_enqueue_order() {
        let (tx, queue) = task_queue();
        for count in 1..=3 {
            tx.enqueue(A, || Ok(RenderUpdate::RebuildVertices { count, epoch: 0 }))
                .unwrap();
        }
        let counts: Vec<u32> = queue
            .drain()
            .into_iter()
            .map(|t| match t.update {
                RenderUpdate::RebuildVertices { count, .. } => count,
                _ => 0,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 3]);
    }

    #[test]
    fn drain_is_exactly_once() {
        let (tx, queue) = task_queue();
        tx.enqueue(A, || Ok(RenderUpdate::ModelView(glam::Mat4::IDENTITY)))
            .unwrap();
        assert_eq!(queue.drain().len(), 1);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn failing_work_queues_nothing() {
        let (tx, queue) = task_queue();
        let result = tx.enqueue(A, || Err(DeviceError::OutOfMemory { requested: 1 }.into()));
        assert!(result.is_err());
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn closed_queue_is_reported() {
        let (tx, queue) = task_queue();
        drop(queue);
        assert_eq!(
            tx.enqueue(A, || Ok(RenderUpdate::ModelView(glam::Mat4::IDENTITY))),
            Err(RenderError::TaskQueueClosed)
        );
    }

    #[test]
    fn clones_share_sequence() {
        let (tx, queue) = task_queue();
        let other = tx.clone();
        std::thread::spawn(move || {
            other
                .enqueue(A, || Ok(RenderUpdate::ModelView(glam::Mat4::IDENTITY)))
                .unwrap()
        })
        .join()
        .unwrap();
        tx.enqueue(A, || Ok(RenderUpdate::ModelView(glam::Mat4::IDENTITY)))
            .unwrap();
        let seqs: Vec<u64> = queue.drain().into_iter().map(|t| t.seq).collect();
        assert_eq!(seqs, vec![0, 1]);
    }
}
