// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 帧节流 (FrameGate)
//!
//! 两次接收帧的间隔必须 >= 阈值. 被拒绝的帧由调用方立即释放, 不做缓存.
//! 单生产者, 不可并发调用.

use crate::config::RuntimeProfile;

#[derive(Debug, Clone)]
pub struct FrameGate {
    threshold_ms: u64,
    last_accepted_ms: Option<u64>,
}

impl FrameGate {
    pub fn new(threshold_ms: u64) -> Self {
        Self {
            threshold_ms,
            last_accepted_ms: None,
        }
    }

    pub fn for_profile(profile: RuntimeProfile) -> Self {
        Self::new(profile.throttle_ms())
    }

    /// 是否接收该时间戳的帧
    ///
    /// 第一帧总是接收. 时间戳倒退视为间隔为0.
    pub fn accept(&mut self, timestamp_ms: u64) -> bool {
        if let Some(last) = self.last_accepted_ms {
            if timestamp_ms.saturating_sub(last) < self.threshold_ms {
                return false;
            }
        }
        self.last_accepted_ms = Some(timestamp_ms);
        true
    }

    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    pub fn last_accepted_ms(&self) -> Option<u64> {
        self.last_accepted_ms
    }

    pub fn reset(&mut self) {
        self.last_accepted_ms = None;
    }
}
