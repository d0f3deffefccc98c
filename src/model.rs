// 该文件是 Yanshi （岩识） 项目的一部分。
// src/model.rs - 模型
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbImage;

/// 目标检测引擎
///
/// 调用是同步的，可能耗时较长；实现必须可在多个线程间共享。
/// 低于 `confidence_threshold` 的结果由引擎自行丢弃。
pub trait Model: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> Result<DetectResult, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x, y, width, height]，原图像素坐标，不做裁剪
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 带有身份编号的检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub id: u64,
  pub item: DetectItem,
}

#[cfg(feature = "engine_tract")]
mod yolov8;
#[cfg(feature = "engine_tract")]
pub use self::yolov8::{Yolov8, Yolov8Builder, Yolov8Error};
