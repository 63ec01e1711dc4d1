// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测结果数据结构定义
/// Data structures for detection results
use serde::Serialize;

// ========== 公共常量 ==========

/// 没有类别时使用的标签
pub const UNKNOWN_LABEL: &str = "Unknown";

// ========== 数据结构 ==========

/// 检测框, 单位为转换后图像的像素
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// 裁剪到 [0, width] × [0, height]
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        let fix = |v: f32, max: f32| if v.is_nan() { 0.0 } else { v.clamp(0.0, max) };
        Self {
            left: fix(self.left, w),
            top: fix(self.top, h),
            right: fix(self.right, w),
            bottom: fix(self.bottom, h),
        }
    }
}

/// 模型给出的一个类别及其分数
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Category {
    pub label: String,
    pub score: f32,
}

impl Category {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// 模型原始输出 (检测框 + 打分类别列表)
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    pub categories: Vec<Category>,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, categories: Vec<Category>) -> Self {
        Self { bbox, categories }
    }

    /// 分数最高的类别; 并列时取第一个, NaN 分数不参与比较
    pub fn top_category(&self) -> Option<&Category> {
        self.categories
            .iter()
            .filter(|c| !c.score.is_nan())
            .fold(None, |best: Option<&Category>, c| match best {
                Some(b) if b.score >= c.score => Some(b),
                _ => Some(c),
            })
    }
}

/// 单个检测
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32, // [0, 1]
    pub bbox: BoundingBox,
}

/// 物理尺寸与距离估计
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SizeEstimate {
    pub width_cm: f32,
    pub height_cm: f32,
    pub distance_m: f32,
}

/// 带尺寸估计的检测结果 (交给下游消费者)
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnnotatedDetection {
    pub detection: Detection,
    pub estimated_size: Option<SizeEstimate>,
    pub image_width: u32,
    pub image_height: u32,
    pub rotation_degrees: u32,
}
