// 该文件是 Yanshi （岩识） 项目的一部分。
// src/output/placeholder.rs - 无数据时的占位帧
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;

use crate::frame::{FrameError, JpegFrame};

const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;
const PLACEHOLDER_TEXT: &str = "Waiting for Stream...";
const PLACEHOLDER_TEXT_X: i32 = 50;
const PLACEHOLDER_TEXT_Y: i32 = 218; // 文字基线约在 240
const PLACEHOLDER_FONT_SIZE: f32 = 30.0;

/// 黑底白字的占位帧
#[derive(Clone)]
pub struct Placeholder {
  font: FontArc,
  quality: u8,
}

impl Placeholder {
  pub fn new(font: FontArc, quality: u8) -> Self {
    Self { font, quality }
  }

  pub fn render(&self) -> RgbImage {
    let mut image = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
    draw_text_mut(
      &mut image,
      Rgb([255u8, 255u8, 255u8]),
      PLACEHOLDER_TEXT_X,
      PLACEHOLDER_TEXT_Y,
      PxScale::from(PLACEHOLDER_FONT_SIZE),
      &self.font,
      PLACEHOLDER_TEXT,
    );
    image
  }

  pub fn encode(&self) -> Result<JpegFrame, FrameError> {
    JpegFrame::encode(&self.render(), self.quality)
  }
}
