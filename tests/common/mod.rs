// 该文件是 Yanshi （岩识） 项目的一部分。
// tests/common/mod.rs - 集成测试公共工具
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

use std::{
  io::Cursor,
  sync::{Arc, Barrier},
  time::Duration,
};

use axum::{
  Router,
  body::Body,
  http::{Request, Response, header},
};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use thiserror::Error;

use yanshi::{
  args::ServiceConfig,
  model::{DetectItem, DetectResult, Model},
  server::Yanshi,
  stream::StreamSettings,
};

const BOUNDARY: &str = "yanshi-test-boundary";

#[derive(Error, Debug)]
#[error("scripted engine failure")]
pub struct ScriptedError;

/// 推理时与测试会合的闸门
pub struct Gate {
  pub entered: Barrier,
  pub release: Barrier,
}

/// 按脚本返回检测结果的模型
pub struct ScriptedModel {
  items: Vec<DetectItem>,
  fail: bool,
  pub gate: Option<Arc<Gate>>,
}

impl ScriptedModel {
  pub fn returning(items: Vec<DetectItem>) -> Self {
    Self {
      items,
      fail: false,
      gate: None,
    }
  }

  pub fn failing() -> Self {
    Self {
      fail: true,
      ..Self::returning(Vec::new())
    }
  }

  pub fn gated(items: Vec<DetectItem>) -> Self {
    Self {
      gate: Some(Arc::new(Gate {
        entered: Barrier::new(2),
        release: Barrier::new(2),
      })),
      ..Self::returning(items)
    }
  }
}

impl Model for ScriptedModel {
  type Error = ScriptedError;

  fn infer(&self, _image: &RgbImage, confidence_threshold: f32) -> Result<DetectResult, ScriptedError> {
    if let Some(gate) = &self.gate {
      gate.entered.wait();
      gate.release.wait();
    }
    if self.fail {
      return Err(ScriptedError);
    }
    let items: Vec<DetectItem> = self
      .items
      .iter()
      .filter(|item| item.score >= confidence_threshold)
      .cloned()
      .collect();
    Ok(DetectResult::from(items))
  }
}

pub fn rock(score: f32, bbox: [f32; 4]) -> DetectItem {
  DetectItem {
    class_id: 0,
    score,
    bbox,
  }
}

pub fn test_config() -> ServiceConfig {
  ServiceConfig {
    stream: StreamSettings {
      fps_cap: 200.0,
      placeholder_retry: Duration::from_millis(5),
      ..StreamSettings::default()
    },
    ..ServiceConfig::default()
  }
}

pub fn app(model: Arc<ScriptedModel>) -> (Yanshi<ScriptedModel>, Router) {
  let app = Yanshi::new(model, &test_config()).unwrap();
  let router = app.clone().router();
  (app, router)
}

pub fn png_bytes() -> Vec<u8> {
  let image = RgbImage::from_pixel(640, 480, Rgb([80, 70, 60]));
  let mut cursor = Cursor::new(Vec::new());
  image.write_to(&mut cursor, ImageFormat::Png).unwrap();
  cursor.into_inner()
}

/// 手工拼装 multipart/form-data 请求体
#[derive(Default)]
pub struct Form {
  body: Vec<u8>,
}

impl Form {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn text(mut self, name: &str, value: &str) -> Self {
    self.body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
      )
      .as_bytes(),
    );
    self
  }

  pub fn file(mut self, name: &str, data: &[u8]) -> Self {
    self.body.extend_from_slice(
      format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"frame.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
      )
      .as_bytes(),
    );
    self.body.extend_from_slice(data);
    self.body.extend_from_slice(b"\r\n");
    self
  }

  pub fn into_request(mut self) -> Request<Body> {
    self
      .body
      .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Request::post("/detect")
      .header(
        header::CONTENT_TYPE,
        format!("multipart/form-data; boundary={BOUNDARY}"),
      )
      .body(Body::from(self.body))
      .unwrap()
  }
}

pub fn detect_request(channel_id: &str, data: &[u8]) -> Request<Body> {
  Form::new()
    .text("channel_id", channel_id)
    .file("file", data)
    .into_request()
}

pub async fn json_body(response: Response<Body>) -> Value {
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  serde_json::from_slice(&bytes).unwrap()
}
