// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型

use thiserror::Error;

/// 颜色转换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConvertError {
    #[error("invalid frame dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("unsupported chroma pixel stride {pixel_stride}")]
    UnsupportedChromaLayout { pixel_stride: usize },

    #[error("accelerated conversion failed: {0}")]
    Accelerated(String),
}

/// 检测模型错误
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model load failed: {0}")]
    Load(String),

    #[error("inference failed: {0}")]
    Inference(String),

    #[error("unexpected model output: {0}")]
    Output(String),
}
