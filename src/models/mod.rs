// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测模型接口与实现
///
/// # 架构说明
///
/// 模型对流水线是一个黑盒: 输入转换后的RGB图像, 输出检测框 + 打分类别列表.
/// 阈值过滤、类别选择和尺寸估计都由 `DetectionAdapter` 完成.
///
/// ## 实现
/// - **SsdMobileNet**: ONNX Runtime 后端 (feature `onnx`), 文件: `ssd_mobilenet.rs`
///
/// ## 使用示例
/// ```ignore
/// use objsize_rs::models::{DetectionModel, ModelConfig, SsdMobileNet};
///
/// let mut model = SsdMobileNet::new(ModelConfig::new("ssd_mobilenet_v1.onnx"))?;
/// let raw = model.detect(&image)?;
/// ```
use anyhow::Result;

use crate::convert::ConvertedImage;
use crate::detection::RawDetection;

#[cfg(feature = "onnx")]
pub mod ssd_mobilenet; // SSD-MobileNet (ort)

#[cfg(feature = "onnx")]
pub use ssd_mobilenet::{ModelConfig, SsdMobileNet};

/// 检测模型统一接口
pub trait DetectionModel: Send {
    /// 对一帧图像执行检测, 输出按模型原生顺序
    fn detect(&mut self, image: &ConvertedImage) -> Result<Vec<RawDetection>>;

    /// 释放模型资源
    fn close(&mut self) {}
}

/// COCO 类别名 (80类)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// SSD 导出模型的类别ID (1-based, 90类编号含空位) → 类别名
pub fn coco_label(class_id: usize) -> Option<&'static str> {
    // TF Object Detection API 的 90 类编号中, 以下ID未使用
    const UNUSED: [usize; 10] = [12, 26, 29, 30, 45, 66, 68, 69, 71, 83];
    if class_id == 0 || class_id > 90 || UNUSED.contains(&class_id) {
        return None;
    }
    let skipped = UNUSED.iter().filter(|&&id| id < class_id).count();
    COCO_CLASSES.get(class_id - 1 - skipped).copied()
}
