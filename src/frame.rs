// 该文件是 Yanshi （岩识） 项目的一部分。
// src/frame.rs - 帧的解码与 JPEG 编码
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

use bytes::Bytes;
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use thiserror::Error;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("空的图像数据")]
  Empty,
  #[error("图像解码错误: {0}")]
  DecodeError(image::ImageError),
  #[error("JPEG 编码错误: {0}")]
  EncodeError(image::ImageError),
}

/// 已编码的 JPEG 帧
///
/// 内部是引用计数的不可变缓冲区，克隆只增加计数，不复制数据。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegFrame {
  data: Bytes,
}

impl JpegFrame {
  pub fn encode(image: &RgbImage, quality: u8) -> Result<Self, FrameError> {
    let mut buffer = Vec::with_capacity((image.width() * image.height()) as usize / 4);
    JpegEncoder::new_with_quality(&mut buffer, quality)
      .encode_image(image)
      .map_err(FrameError::EncodeError)?;

    Ok(Self {
      data: Bytes::from(buffer),
    })
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }
}

impl AsRef<[u8]> for JpegFrame {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

/// 按内容识别格式并解码为 RGB 图像
pub fn decode_image(data: &[u8]) -> Result<RgbImage, FrameError> {
  if data.is_empty() {
    return Err(FrameError::Empty);
  }

  let image = image::load_from_memory(data).map_err(FrameError::DecodeError)?;
  Ok(image.to_rgb8())
}
