// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// - DetectionAdapter: 包装检测模型, 置信度过滤
/// - SizeEstimator:    针孔模型尺寸/距离估计
pub mod adapter;
pub mod size_estimator;
pub mod types;

pub use adapter::{DetectionAdapter, DetectorStatus};
pub use size_estimator::{estimate, prior_for};
pub use types::{AnnotatedDetection, BoundingBox, Category, Detection, RawDetection, SizeEstimate};
