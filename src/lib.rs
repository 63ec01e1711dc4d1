// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 单目相机物体尺寸估计流水线
//! Monocular object size estimation pipeline
//!
//! RawFrame → FrameGate → ColorConverter → DetectionAdapter → SizeEstimator
pub mod config; // 运行档位与流水线配置
pub mod convert; // YUV → RGB 颜色空间转换
pub mod detection; // 检测适配与尺寸估计
pub mod error;
pub mod input; // 帧输入: 原始帧、节流、最新帧队列
pub mod models; // 检测模型接口与具体实现
pub mod pipeline;
pub mod telemetry; // 可注入的观测接口

#[cfg(test)]
pub(crate) mod test_support;

pub use crate::config::{PipelineConfig, RuntimeProfile};
pub use crate::convert::{Backend, ColorConverter, ConvertedImage};
pub use crate::detection::{
    estimate, AnnotatedDetection, BoundingBox, Category, DetectionAdapter, DetectorStatus,
    RawDetection, SizeEstimate,
};
pub use crate::error::{ConvertError, ModelError};
pub use crate::input::{FrameGate, FrameReceiver, FrameSender, LatestFrameQueue, Plane, RawFrame};
pub use crate::models::DetectionModel;
pub use crate::pipeline::{FrameOutcome, FrameWorker, Pipeline, PipelineStats};
pub use crate::telemetry::{MemorySink, NullSink, ObservabilitySink, PipelineEvent, TracingSink};
