// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 单目针孔相机尺寸/距离估计
//!
//! 按类别查表得到物体的典型物理尺寸, 再由检测框像素尺寸反推距离:
//! 焦距 ≈ 图像宽度 × 0.87 (约 60° 水平视场), 高度推算的距离权重更大.
//! 纯函数, 无状态.
use phf::phf_map;

use super::types::{BoundingBox, SizeEstimate};

/// 焦距系数 (像素焦距 = 图像宽度 × 系数)
pub const FOCAL_FACTOR: f32 = 0.87;
/// 高度推算距离的权重 (直立物体更稳定)
pub const HEIGHT_WEIGHT: f32 = 0.7;
pub const WIDTH_WEIGHT: f32 = 0.3;
pub const MIN_DISTANCE_M: f32 = 0.2;
pub const MAX_DISTANCE_M: f32 = 15.0;
/// 检测框退化时的距离 (未测量)
pub const UNMEASURED_DISTANCE_M: f32 = 1.0;
/// 未知类别的默认尺寸 (cm)
pub const DEFAULT_SIZE_CM: (f32, f32) = (30.0, 30.0);

/// 类别典型尺寸 (宽, 高), 单位 cm
static PRIORS_CM: phf::Map<&'static str, (f32, f32)> = phf_map! {
    "person" => (45.0, 170.0),
    "car" => (180.0, 150.0),
    "motorcycle" => (80.0, 120.0),
    "bicycle" => (60.0, 110.0),
    "bus" => (250.0, 300.0),
    "truck" => (250.0, 300.0),
    "chair" => (50.0, 90.0),
    "couch" => (180.0, 80.0),
    "laptop" => (35.0, 23.0),
    "cell phone" => (7.0, 15.0),
    "bottle" => (7.0, 25.0),
    "cup" => (8.0, 10.0),
    "book" => (15.0, 23.0),
    "dog" => (40.0, 60.0),
    "cat" => (25.0, 25.0),
};

/// 查询类别的典型尺寸 (宽, 高) cm, 未知类别返回 30×30
pub fn prior_for(label: &str) -> (f32, f32) {
    PRIORS_CM.get(label).copied().unwrap_or(DEFAULT_SIZE_CM)
}

/// 估计物体尺寸与距离
pub fn estimate(bbox: &BoundingBox, label: &str, image_width: u32) -> SizeEstimate {
    let (real_width, real_height) = prior_for(label);
    let pixel_width = bbox.width();
    let pixel_height = bbox.height();
    let focal = image_width as f32 * FOCAL_FACTOR;

    // 退化检测框 (含 NaN) 或无效焦距: 返回先验尺寸, 距离为哨兵值
    if !(pixel_width > 0.0 && pixel_height > 0.0 && focal > 0.0) {
        return SizeEstimate {
            width_cm: real_width,
            height_cm: real_height,
            distance_m: UNMEASURED_DISTANCE_M,
        };
    }

    let distance_from_height = real_height * focal / pixel_height / 100.0;
    let distance_from_width = real_width * focal / pixel_width / 100.0;
    let distance = (HEIGHT_WEIGHT * distance_from_height + WIDTH_WEIGHT * distance_from_width)
        .clamp(MIN_DISTANCE_M, MAX_DISTANCE_M);

    SizeEstimate {
        width_cm: pixel_width * distance * 100.0 / focal,
        height_cm: pixel_height * distance * 100.0 / focal,
        distance_m: distance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32, rel: f32) {
        assert!(
            ((actual - expected) / expected).abs() <= rel,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_person_reference_case() {
        let bbox = BoundingBox::new(100.0, 100.0, 150.0, 300.0);
        let est = estimate(&bbox, "person", 640);
        // focal 556.8, dH 4.7328, dW 5.0112 → 4.8163
        assert_close(est.distance_m, 4.8163, 0.005);
        assert_close(est.width_cm, 43.25, 0.005);
        assert_close(est.height_cm, 173.0, 0.005);
    }

    #[test]
    fn test_unknown_label_uses_default_prior() {
        assert_eq!(prior_for("giraffe"), (30.0, 30.0));
        assert_eq!(prior_for(""), (30.0, 30.0));
        assert_eq!(prior_for("cell phone"), (7.0, 15.0));

        // 30×30 prior, 100×100 px, width 1000 → dH = dW = 2.61
        let est = estimate(&BoundingBox::new(0.0, 0.0, 100.0, 100.0), "giraffe", 1000);
        assert_close(est.distance_m, 2.61, 0.001);
        assert_close(est.width_cm, 30.0, 0.001);
    }

    #[test]
    fn test_degenerate_box_returns_prior() {
        let zero_width = BoundingBox::new(50.0, 10.0, 50.0, 200.0);
        let est = estimate(&zero_width, "person", 640);
        assert_eq!(
            est,
            SizeEstimate {
                width_cm: 45.0,
                height_cm: 170.0,
                distance_m: 1.0
            }
        );

        let inverted = BoundingBox::new(10.0, 200.0, 60.0, 100.0);
        assert_eq!(estimate(&inverted, "dog", 640).distance_m, 1.0);
        assert_eq!(estimate(&inverted, "dog", 640).height_cm, 60.0);
    }

    #[test]
    fn test_distance_is_clamped() {
        // 巨大的框 → 很近, 钳位到 0.2m
        let near = estimate(&BoundingBox::new(0.0, 0.0, 4000.0, 4000.0), "cup", 640);
        assert_eq!(near.distance_m, MIN_DISTANCE_M);
        // 1px 的公交车 → 很远, 钳位到 15m
        let far = estimate(&BoundingBox::new(0.0, 0.0, 1.0, 1.0), "bus", 640);
        assert_eq!(far.distance_m, MAX_DISTANCE_M);
        assert!(far.width_cm > 0.0 && far.height_cm > 0.0);
    }
}
