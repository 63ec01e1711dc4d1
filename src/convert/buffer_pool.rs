// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 转换缓冲区池, 按 (width, height) 复用
//!
//! 尺寸不变时复用上一帧的缓冲区; 尺寸变化时先释放旧缓冲区再分配新的.

use super::{nv21, ConvertedImage};

/// 一帧转换所需的缓冲区
#[derive(Debug, Default)]
pub struct FrameBuffers {
    /// NV21 暂存区 (加速路径输入), 长度按4字节对齐
    pub staging: Vec<u8>,
    /// 输出RGB图像
    pub image: ConvertedImage,
}

#[derive(Debug)]
pub struct BufferPool {
    key: Option<(u32, u32)>,
    buffers: FrameBuffers,
    with_staging: bool,
    allocations: u64,
}

impl BufferPool {
    pub fn new(with_staging: bool) -> Self {
        Self {
            key: None,
            buffers: FrameBuffers::default(),
            with_staging,
            allocations: 0,
        }
    }

    /// 获取指定尺寸的缓冲区, 返回值表示是否重新分配
    pub fn acquire(&mut self, width: u32, height: u32) -> bool {
        if self.key == Some((width, height)) {
            return false;
        }

        // 先释放旧缓冲区
        self.release();

        let staging = if self.with_staging {
            vec![0u8; nv21::staging_len(width, height)]
        } else {
            Vec::new()
        };
        self.buffers = FrameBuffers {
            staging,
            image: ConvertedImage::allocate(width, height),
        };
        self.key = Some((width, height));
        self.allocations += 1;
        true
    }

    pub fn buffers_mut(&mut self) -> &mut FrameBuffers {
        &mut self.buffers
    }

    pub fn image(&self) -> &ConvertedImage {
        &self.buffers.image
    }

    /// 释放缓存的缓冲区 (可重复调用)
    pub fn release(&mut self) {
        self.buffers = FrameBuffers::default();
        self.key = None;
    }

    pub fn key(&self) -> Option<(u32, u32)> {
        self.key
    }

    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn has_staging(&self) -> bool {
        self.with_staging
    }

    /// 切换是否分配暂存区, 下次重新分配时生效
    pub fn set_staging(&mut self, with_staging: bool) {
        self.with_staging = with_staging;
    }

    pub fn staging(&self) -> &[u8] {
        &self.buffers.staging
    }
}
