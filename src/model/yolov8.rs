// 该文件是 Yanshi （岩识） 项目的一部分。
// src/model/yolov8.rs - YOLOv8 ONNX 推理引擎
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

use std::io::Cursor;

use image::{RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{DetectItem, DetectResult, Model},
};

const YOLOV8_INPUT_W: u32 = 640;
const YOLOV8_INPUT_H: u32 = 640;
const YOLOV8_BOX_ATTRS: usize = 4; // cx, cy, w, h
const YOLOV8_PAD_VALUE: f32 = 144.0 / 255.0;
const YOLOV8_NMS_THRESH: f32 = 0.45;

type Plan = TypedRunnableModel<TypedModel>;

pub struct Yolov8 {
  plan: Plan,
  nms_threshold: f32,
}

#[derive(Error, Debug)]
pub enum Yolov8Error {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, TractError),
  #[error("推理错误: {0}")]
  InferenceError(TractError),
  #[error("模型输出不符合预期: {0}")]
  UnexpectedOutput(String),
  #[error("输入图像为空")]
  EmptyImage,
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
}

impl From<std::io::Error> for Yolov8Error {
  fn from(err: std::io::Error) -> Self {
    Yolov8Error::ModelLoadError(err)
  }
}

impl Yolov8Error {
  pub fn invalid(msg: &str, e: TractError) -> Self {
    Yolov8Error::ModelInvalid(msg.to_string(), e)
  }
}

pub struct Yolov8Builder {
  model_path: String,
  nms_threshold: f32,
}

impl FromUrlWithScheme for Yolov8Builder {
  const SCHEME: &'static str = "yolov8";
}

impl FromUrl for Yolov8Builder {
  type Error = Yolov8Error;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(Yolov8Error::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    Ok(Yolov8Builder {
      model_path: url.path().to_string(),
      nms_threshold: YOLOV8_NMS_THRESH,
    })
  }
}

impl Yolov8Builder {
  pub fn nms_threshold(mut self, nms_threshold: f32) -> Self {
    self.nms_threshold = nms_threshold;
    self
  }

  pub fn build(self) -> Result<Yolov8, Yolov8Error> {
    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 ONNX 推理计划");
    let plan = tract_onnx::onnx()
      .model_for_read(&mut Cursor::new(model_data))
      .map_err(|e| Yolov8Error::invalid("无法解析 ONNX 模型", e))?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(
          f32::datum_type(),
          tvec!(1, 3, YOLOV8_INPUT_H as usize, YOLOV8_INPUT_W as usize),
        ),
      )
      .map_err(|e| Yolov8Error::invalid("无法设置输入形状", e))?
      .into_optimized()
      .map_err(|e| Yolov8Error::invalid("无法优化模型", e))?
      .into_runnable()
      .map_err(|e| Yolov8Error::invalid("无法构建推理计划", e))?;
    info!("模型加载完成");

    Ok(Yolov8 {
      plan,
      nms_threshold: self.nms_threshold,
    })
  }
}

impl Yolov8 {
  /// 等比缩放到输入尺寸，右侧与下方以灰色填充
  fn preprocess(image: &RgbImage) -> Result<(Tensor, f32), Yolov8Error> {
    let (w0, h0) = image.dimensions();
    if w0 == 0 || h0 == 0 {
      return Err(Yolov8Error::EmptyImage);
    }

    let ratio = (YOLOV8_INPUT_W as f32 / w0 as f32).min(YOLOV8_INPUT_H as f32 / h0 as f32);
    let w_new = ((w0 as f32 * ratio).round() as u32).clamp(1, YOLOV8_INPUT_W);
    let h_new = ((h0 as f32 * ratio).round() as u32).clamp(1, YOLOV8_INPUT_H);
    let resized = image::imageops::resize(image, w_new, h_new, FilterType::Triangle);

    let input = tract_ndarray::Array4::from_shape_fn(
      (1, 3, YOLOV8_INPUT_H as usize, YOLOV8_INPUT_W as usize),
      |(_, c, y, x)| {
        let (x, y) = (x as u32, y as u32);
        if x < w_new && y < h_new {
          resized.get_pixel(x, y)[c] as f32 / 255.0
        } else {
          YOLOV8_PAD_VALUE
        }
      },
    );

    Ok((Tensor::from(input), ratio))
  }

  fn postprocess(
    &self,
    outputs: TVec<TValue>,
    confidence_threshold: f32,
    ratio: f32,
  ) -> Result<DetectResult, Yolov8Error> {
    let output = outputs
      .first()
      .ok_or_else(|| Yolov8Error::UnexpectedOutput("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(Yolov8Error::InferenceError)?;

    let shape = view.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 {
      return Err(Yolov8Error::UnexpectedOutput(format!(
        "期望形状 [1, 4 + nc, anchors], 实际 {:?}",
        shape
      )));
    }

    let preds = view
      .index_axis(tract_ndarray::Axis(0), 0)
      .into_dimensionality::<tract_ndarray::Ix2>()
      .map_err(|e| Yolov8Error::UnexpectedOutput(e.to_string()))?;
    // 部分导出为 [anchors, 4 + nc]
    let preds = if preds.nrows() > preds.ncols() {
      preds.reversed_axes()
    } else {
      preds
    };
    if preds.nrows() <= YOLOV8_BOX_ATTRS {
      return Err(Yolov8Error::UnexpectedOutput(format!(
        "属性数量 {} 不足",
        preds.nrows()
      )));
    }

    let mut items = decode_predictions(preds, confidence_threshold, ratio);
    debug!("阈值过滤后 {} 个候选框", items.len());
    non_max_suppression(&mut items, self.nms_threshold);
    debug!("检测到 {} 个物体", items.len());

    Ok(items.into())
  }
}

impl Model for Yolov8 {
  type Error = Yolov8Error;

  fn infer(&self, image: &RgbImage, confidence_threshold: f32) -> Result<DetectResult, Self::Error> {
    debug!("设置模型输入");
    let (input, ratio) = Self::preprocess(image)?;

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(input.into()))
      .map_err(Yolov8Error::InferenceError)?;

    self.postprocess(outputs, confidence_threshold, ratio)
  }
}

/// 解析 [4 + nc, anchors] 形式的预测，坐标换算回原图像素
fn decode_predictions(
  preds: tract_ndarray::ArrayView2<'_, f32>,
  confidence_threshold: f32,
  ratio: f32,
) -> Vec<DetectItem> {
  let num_attrs = preds.nrows();
  let mut items = Vec::new();

  for anchor in 0..preds.ncols() {
    let (mut class_id, mut score) = (0u32, f32::MIN);
    for attr in YOLOV8_BOX_ATTRS..num_attrs {
      let value = preds[[attr, anchor]];
      if value > score {
        score = value;
        class_id = (attr - YOLOV8_BOX_ATTRS) as u32;
      }
    }

    if score < confidence_threshold {
      continue;
    }

    let cx = preds[[0, anchor]] / ratio;
    let cy = preds[[1, anchor]] / ratio;
    let w = preds[[2, anchor]] / ratio;
    let h = preds[[3, anchor]] / ratio;

    items.push(DetectItem {
      class_id,
      score,
      bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
    });
  }

  items
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = (a[0] + a[2]).min(b[0] + b[2]);
  let y2 = (a[1] + a[3]).min(b[1] + b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a[2] * a[3] + b[2] * b[3] - intersection;
  if union <= 0.0 {
    0.0
  } else {
    intersection / union
  }
}

/// 贪心 NMS，结果按置信度降序
fn non_max_suppression(items: &mut Vec<DetectItem>, iou_threshold: f32) {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept = 0;
  for index in 0..items.len() {
    let suppressed = (0..kept).any(|prev| iou(&items[prev].bbox, &items[index].bbox) > iou_threshold);
    if !suppressed {
      items.swap(kept, index);
      kept += 1;
    }
  }
  items.truncate(kept);
}
