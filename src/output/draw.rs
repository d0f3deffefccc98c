// 该文件是 Yanshi （岩识） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};

use crate::model::Detection;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_TEXT_HEIGHT: i32 = 20;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 1;
const BOX_THICKNESS: i32 = 2;
const BOX_COLOR: [u8; 3] = [255, 0, 255]; // 品红
const TEXT_COLOR: [u8; 3] = [255, 255, 255]; // 白色

/// 检测框绘制器
///
/// 每个检测绘制一个边框和一个 "Rock #<id>" 标签。检测坐标原样使用，
/// 超出画布的部分在绘制时裁掉。
#[derive(Clone)]
pub struct Draw {
  font: FontArc,
  font_size: f32,
  label_text_height: i32,
  label_text_vertical_padding: i32,
  box_color: [u8; 3],
  text_color: [u8; 3],
}

impl Draw {
  pub fn new(font: FontArc) -> Self {
    Self {
      font,
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      box_color: BOX_COLOR,
      text_color: TEXT_COLOR,
    }
  }

  /// 返回绘制了检测结果的新图像，输入保持不变
  pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();
    for detection in detections {
      self.draw_bbox_with_label(&mut canvas, detection);
    }
    canvas
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, detection: &Detection) {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let [x, y, bw, bh] = detection.item.bbox;

    // 收拢到画布外一圈，避免极端坐标在 Rect 运算中溢出
    let margin = (BOX_THICKNESS + 1) as f32;
    let x_min = x.round().clamp(-margin, w + margin) as i32;
    let y_min = y.round().clamp(-margin, h + margin) as i32;
    let x_max = (x + bw).round().clamp(-margin, w + margin) as i32;
    let y_max = (y + bh).round().clamp(-margin, h + margin) as i32;

    if x_max < 0 || y_max < 0 || x_min >= w as i32 || y_min >= h as i32 {
      return;
    }

    // 绘制边框（加粗为2像素）
    for thickness in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * thickness;
      let height = y_max - y_min - 2 * thickness;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + thickness, y_min + thickness).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, Rgb(self.box_color));
    }

    // 标签放在边框上方，顶部不足时贴住画布上沿
    let label = format!("Rock #{}", detection.id);
    let scale = PxScale::from(self.font_size);
    let (text_width, _) = text_size(scale, &self.font, &label);

    let label_x = x_min;
    let label_y = (y_min - self.label_text_height).max(0);
    let rect = Rect::at(label_x, label_y).of_size(text_width.max(1), self.label_text_height as u32);
    draw_filled_rect_mut(image, rect, Rgb(self.box_color));

    draw_text_mut(
      image,
      Rgb(self.text_color),
      label_x,
      label_y + self.label_text_vertical_padding,
      scale,
      &self.font,
      &label,
    );
  }
}
