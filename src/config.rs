// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线配置 - 启动时由运行档位一次性解析, 也可通过JSON文件调整参数

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 运行档位 (设备能力)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeProfile {
    /// 标准设备
    #[default]
    Standard,
    /// 受限/旧设备: 更长的节流间隔, 更高的置信度阈值
    Constrained,
}

impl RuntimeProfile {
    /// 帧节流间隔 (毫秒)
    pub fn throttle_ms(&self) -> u64 {
        match self {
            RuntimeProfile::Standard => 100,
            RuntimeProfile::Constrained => 150,
        }
    }

    /// 推荐的置信度阈值
    pub fn default_confidence(&self) -> f32 {
        match self {
            RuntimeProfile::Standard => 0.5,
            RuntimeProfile::Constrained => 0.6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RuntimeProfile::Standard => "standard",
            RuntimeProfile::Constrained => "constrained",
        }
    }
}

impl std::str::FromStr for RuntimeProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(RuntimeProfile::Standard),
            "constrained" | "legacy" => Ok(RuntimeProfile::Constrained),
            other => Err(format!("unknown runtime profile: {}", other)),
        }
    }
}

/// 流水线参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub profile: RuntimeProfile,
    pub throttle_ms: u64,          // 两次接收帧的最小间隔
    pub confidence_threshold: f32, // 检测置信度阈值
    pub prefer_accelerated: bool,  // 优先使用GPU转换
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_profile(RuntimeProfile::Standard)
    }
}

impl PipelineConfig {
    /// 由运行档位解析默认配置
    pub fn for_profile(profile: RuntimeProfile) -> Self {
        Self {
            profile,
            throttle_ms: profile.throttle_ms(),
            confidence_threshold: profile.default_confidence(),
            prefer_accelerated: true,
        }
    }

    /// 从JSON文件加载配置, 文件不存在或解析失败时使用档位默认值
    pub fn load(path: impl AsRef<Path>, profile: RuntimeProfile) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Self>(&json) {
                Ok(config) => {
                    tracing::info!("✅ 配置已从 {} 加载", path.display());
                    config.sanitized()
                }
                Err(e) => {
                    tracing::warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::for_profile(profile)
                }
            },
            Err(_) => {
                tracing::info!("📝 配置文件不存在, 使用 {} 档位默认值", profile.name());
                Self::for_profile(profile)
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        tracing::info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 阈值限制在 [0, 1]
    fn sanitized(mut self) -> Self {
        if !self.confidence_threshold.is_finite() {
            self.confidence_threshold = self.profile.default_confidence();
        }
        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);
        self
    }
}
