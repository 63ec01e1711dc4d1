// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! SSD-MobileNet 检测模型 (ONNX Runtime)
//!
//! 输入: uint8 NHWC [1, S, S, 3]
//! 输出: detection_boxes [1, N, 4] (归一化 ymin, xmin, ymax, xmax),
//!       detection_classes [1, N] (1-based COCO id), detection_scores [1, N],
//!       num_detections [1]
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use fast_image_resize as fr;
use ndarray::Array4;

use super::{coco_label, DetectionModel};
use crate::convert::ConvertedImage;
use crate::detection::types::UNKNOWN_LABEL;
use crate::detection::{BoundingBox, Category, RawDetection};
use crate::error::ModelError;

/// 模型参数
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub input_size: u32,      // SSD 输入边长
    pub max_results: usize,   // 最多返回的检测数
    pub score_threshold: f32, // 模型侧分数下限
    pub num_threads: usize,   // 推理线程数
}

impl ModelConfig {
    pub fn new(model_path: impl AsRef<Path>) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            input_size: 300,
            max_results: 10,
            score_threshold: 0.5,
            num_threads: 4,
        }
    }
}

/// 输出张量名 (不同导出工具的命名略有差异, 按关键字匹配)
#[derive(Debug, Clone)]
struct OutputNames {
    boxes: String,
    classes: String,
    scores: String,
    count: String,
}

impl OutputNames {
    fn resolve(names: &[String]) -> Result<Self> {
        let find = |key: &str| -> Result<String> {
            names
                .iter()
                .find(|n| n.contains(key))
                .cloned()
                .ok_or_else(|| ModelError::Output(format!("缺少输出张量 {}", key)).into())
        };
        Ok(Self {
            boxes: find("boxes")?,
            classes: find("classes")?,
            scores: find("scores")?,
            count: find("num_detections")?,
        })
    }
}

pub struct SsdMobileNet {
    session: Option<ort::Session>,
    config: ModelConfig,
    input_name: String,
    outputs: OutputNames,
    resizer: fr::Resizer,
}

impl SsdMobileNet {
    /// 加载模型
    pub fn new(config: ModelConfig) -> Result<Self> {
        let session = ort::Session::builder()
            .and_then(|b| b.with_optimization_level(ort::GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(config.num_threads))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| ModelError::Load(e.to_string()))
            .with_context(|| format!("加载模型失败: {}", config.model_path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| ModelError::Load("模型没有输入".to_string()))?;
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        let outputs = OutputNames::resolve(&output_names)?;

        tracing::info!(
            model = %config.model_path.display(),
            input = %input_name,
            threads = config.num_threads,
            "✅ SSD-MobileNet 模型已加载"
        );

        Ok(Self {
            session: Some(session),
            config,
            input_name,
            outputs,
            resizer: fr::Resizer::new(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// RGB → [1, S, S, 3] uint8
    fn preprocess(&mut self, image: &ConvertedImage) -> Result<Array4<u8>> {
        let size = self.config.input_size;
        let src = fr::images::ImageRef::new(
            image.width(),
            image.height(),
            image.as_rgb(),
            fr::PixelType::U8x3,
        )
        .map_err(|e| ModelError::Inference(format!("源图像无效: {}", e)))?;

        let mut dst = fr::images::Image::new(size, size, fr::PixelType::U8x3);
        self.resizer
            .resize(
                &src,
                &mut dst,
                &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
            )
            .map_err(|e| ModelError::Inference(format!("缩放失败: {}", e)))?;

        let side = size as usize;
        Array4::from_shape_vec((1, side, side, 3), dst.into_vec())
            .map_err(|e| ModelError::Inference(e.to_string()).into())
    }
}

impl DetectionModel for SsdMobileNet {
    fn detect(&mut self, image: &ConvertedImage) -> Result<Vec<RawDetection>> {
        let input = self.preprocess(image)?;
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ModelError::Inference("模型已关闭".to_string()))?;

        let tensor = ort::Tensor::from_array(input)?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => tensor]?)?;

        let boxes: Vec<f32> = outputs[self.outputs.boxes.as_str()]
            .try_extract_tensor::<f32>()?
            .iter()
            .copied()
            .collect();
        let classes: Vec<f32> = outputs[self.outputs.classes.as_str()]
            .try_extract_tensor::<f32>()?
            .iter()
            .copied()
            .collect();
        let scores: Vec<f32> = outputs[self.outputs.scores.as_str()]
            .try_extract_tensor::<f32>()?
            .iter()
            .copied()
            .collect();
        let count = outputs[self.outputs.count.as_str()]
            .try_extract_tensor::<f32>()?
            .iter()
            .next()
            .map(|&n| n.max(0.0) as usize)
            .unwrap_or(scores.len());

        Ok(decode(
            &boxes,
            &classes,
            &scores,
            count,
            (image.width(), image.height()),
            &self.config,
        ))
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!("🧹 SSD-MobileNet 会话已释放");
        }
    }
}

/// 解码模型输出: 分数下限过滤 + 最多 max_results 个, 保持模型原生顺序
fn decode(
    boxes: &[f32],
    classes: &[f32],
    scores: &[f32],
    count: usize,
    (width, height): (u32, u32),
    config: &ModelConfig,
) -> Vec<RawDetection> {
    let n = count.min(scores.len()).min(classes.len()).min(boxes.len() / 4);
    let (w, h) = (width as f32, height as f32);

    (0..n)
        .filter(|&i| scores[i] >= config.score_threshold)
        .take(config.max_results)
        .map(|i| {
            let b = &boxes[i * 4..i * 4 + 4];
            let bbox = BoundingBox::new(b[1] * w, b[0] * h, b[3] * w, b[2] * h);
            let label = coco_label(classes[i].round().max(0.0) as usize).unwrap_or(UNKNOWN_LABEL);
            RawDetection::new(bbox, vec![Category::new(label, scores[i])])
        })
        .collect()
}
