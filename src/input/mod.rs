// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 帧输入系统 (Frame Input System)
///
/// - RawFrame:        相机原始YUV帧 (drop时归还缓冲区)
/// - FrameGate:       帧节流
/// - LatestFrameQueue: 只保留最新帧的背压队列
pub mod frame;
pub mod frame_gate;
pub mod latest;

pub use frame::{Plane, RawFrame};
pub use frame_gate::FrameGate;
pub use latest::{FrameIter, FrameReceiver, FrameSender, LatestFrameQueue};
