// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 最新帧队列 (keep only latest)
//!
//! 容量为1的通道. 处理线程忙时新帧挤掉旧帧, 被挤掉的帧在 drop 时释放.
//! 消费端关闭后不再缓存任何帧: 新帧立即释放, 排队中的帧一并清空.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, RecvError, Sender, TryRecvError, TrySendError};

use super::frame::RawFrame;

pub struct LatestFrameQueue {
    tx: Sender<RawFrame>,
    rx: Receiver<RawFrame>,
    evicted: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl Default for LatestFrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestFrameQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self {
            tx,
            rx,
            evicted: Arc::new(AtomicU64::new(0)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 拆分为生产端和消费端
    pub fn split(self) -> (FrameSender, FrameReceiver) {
        let sender = FrameSender {
            tx: self.tx,
            drain: self.rx.clone(),
            evicted: self.evicted,
            closed: self.closed.clone(),
        };
        let receiver = FrameReceiver {
            rx: self.rx,
            closed: self.closed,
        };
        (sender, receiver)
    }
}

/// 清空通道中排队的帧 (drop 即释放)
fn drain_pending(rx: &Receiver<RawFrame>) {
    while let Ok(stale) = rx.try_recv() {
        drop(stale);
    }
}

/// 生产端 (相机回调线程)
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<RawFrame>,
    drain: Receiver<RawFrame>,
    evicted: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl FrameSender {
    /// 投递新帧; 队列已满时丢弃排队中的旧帧.
    /// 返回 false 表示消费端已关闭 (帧已被释放).
    pub fn push(&self, frame: RawFrame) -> bool {
        if self.is_closed() {
            drain_pending(&self.drain);
            drop(frame);
            return false;
        }

        let mut frame = frame;
        loop {
            match self.tx.try_send(frame) {
                Ok(()) => break,
                Err(TrySendError::Full(back)) => {
                    match self.drain.try_recv() {
                        Ok(stale) => {
                            self.evicted.fetch_add(1, Ordering::Relaxed);
                            drop(stale);
                        }
                        Err(TryRecvError::Empty) => {}
                        Err(TryRecvError::Disconnected) => return false,
                    }
                    frame = back;
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }

        // 投递期间消费端关闭: 刚放入的帧没人会取
        if self.is_closed() {
            drain_pending(&self.drain);
            return false;
        }
        true
    }

    /// 消费端是否已关闭
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// 被挤掉的旧帧数量
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }
}

/// 消费端 (处理线程). drop 时标记关闭并释放排队中的帧.
pub struct FrameReceiver {
    rx: Receiver<RawFrame>,
    closed: Arc<AtomicBool>,
}

impl FrameReceiver {
    /// 阻塞等待下一帧; 所有生产端关闭后返回错误
    pub fn recv(&self) -> Result<RawFrame, RecvError> {
        self.rx.recv()
    }

    pub fn try_recv(&self) -> Result<RawFrame, TryRecvError> {
        self.rx.try_recv()
    }
}

impl Drop for FrameReceiver {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
        drain_pending(&self.rx);
    }
}

/// 逐帧迭代直到所有生产端关闭
pub struct FrameIter {
    receiver: FrameReceiver,
}

impl Iterator for FrameIter {
    type Item = RawFrame;

    fn next(&mut self) -> Option<RawFrame> {
        self.receiver.recv().ok()
    }
}

impl IntoIterator for FrameReceiver {
    type Item = RawFrame;
    type IntoIter = FrameIter;

    fn into_iter(self) -> FrameIter {
        FrameIter { receiver: self }
    }
}
