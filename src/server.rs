// 该文件是 Yanshi （岩识） 项目的一部分。
// src/server.rs - HTTP 服务
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

use std::sync::Arc;

use axum::{
  Json, Router,
  body::Body,
  extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartRejection},
  http::{StatusCode, header},
  response::{IntoResponse, Response},
  routing::{get, post},
};
use bytes::Bytes;
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;
use tracing::{Level, error, warn};

use crate::{
  args::ServiceConfig,
  channel::ChannelTable,
  identity::{IdentityStrategy, IdentityTracker},
  intake::{IntakeError, IntakeGateway, Submission},
  model::Model,
  output::{Draw, OutputError, Placeholder, embedded_font},
  stream::{CONTENT_TYPE, StreamPublisher},
};

#[derive(Error, Debug)]
pub enum ApiError {
  #[error("请求格式错误: {0}")]
  BadRequest(String),
  #[error(transparent)]
  Intake(#[from] IntakeError),
  #[error("检测任务异常终止: {0}")]
  Join(#[from] JoinError),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_)
      | ApiError::Intake(IntakeError::InvalidChannel(_))
      | ApiError::Intake(IntakeError::DecodeFailure(_)) => StatusCode::BAD_REQUEST,
      ApiError::Intake(IntakeError::InferenceFailure(_))
      | ApiError::Intake(IntakeError::EncodeFailure(_))
      | ApiError::Join(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  /// 推理失败已由入口记录，这里不再重复
  fn log_level(&self) -> Option<Level> {
    match self {
      ApiError::Intake(IntakeError::InferenceFailure(_)) => None,
      _ if self.status().is_server_error() => Some(Level::ERROR),
      _ => Some(Level::WARN),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self.log_level() {
      Some(level) if level == Level::ERROR => error!("检测请求失败: {}", self),
      Some(_) => warn!("检测请求被拒绝: {}", self),
      None => {}
    }

    let status = self.status();
    if status.is_server_error() {
      let body = json!({ "status": "error", "message": self.to_string() });
      (status, Json(body)).into_response()
    } else {
      (status, Json(json!({ "status": "error" }))).into_response()
    }
  }
}

/// 服务实例，持有全部共享状态
pub struct Yanshi<M> {
  gateway: Arc<IntakeGateway<M>>,
  identities: Arc<IdentityTracker>,
  publisher: StreamPublisher,
  max_upload_bytes: usize,
}

impl<M> Clone for Yanshi<M> {
  fn clone(&self) -> Self {
    Self {
      gateway: self.gateway.clone(),
      identities: self.identities.clone(),
      publisher: self.publisher.clone(),
      max_upload_bytes: self.max_upload_bytes,
    }
  }
}

impl<M: Model + 'static> Yanshi<M> {
  pub fn new(model: Arc<M>, config: &ServiceConfig) -> Result<Self, OutputError> {
    Self::build(model, config, None)
  }

  pub fn with_strategy(
    model: Arc<M>,
    config: &ServiceConfig,
    strategy: Arc<dyn IdentityStrategy>,
  ) -> Result<Self, OutputError> {
    Self::build(model, config, Some(strategy))
  }

  fn build(
    model: Arc<M>,
    config: &ServiceConfig,
    strategy: Option<Arc<dyn IdentityStrategy>>,
  ) -> Result<Self, OutputError> {
    let font = embedded_font()?;
    let channels = Arc::new(ChannelTable::new(config.max_channels));
    let identities = Arc::new(IdentityTracker::new());

    let mut gateway = IntakeGateway::new(
      model,
      channels.clone(),
      identities.clone(),
      Draw::new(font.clone()),
      config.intake,
    );
    if let Some(strategy) = strategy {
      gateway = gateway.with_strategy(strategy);
    }

    let placeholder = Placeholder::new(font, config.stream.jpeg_quality);
    let publisher = StreamPublisher::new(channels, placeholder, config.stream);

    Ok(Self {
      gateway: Arc::new(gateway),
      identities,
      publisher,
      max_upload_bytes: config.max_upload_bytes,
    })
  }

  pub fn identities(&self) -> &Arc<IdentityTracker> {
    &self.identities
  }

  pub fn router(self) -> Router {
    let limit = self.max_upload_bytes;
    Router::new()
      .route("/detect", post(detect::<M>))
      .route("/video_feed/:channel_id", get(video_feed::<M>))
      .route("/stats", get(stats::<M>))
      .layer(DefaultBodyLimit::max(limit))
      .with_state(self)
  }
}

async fn detect<M: Model + 'static>(
  State(app): State<Yanshi<M>>,
  multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
  let mut multipart = multipart.map_err(|err| ApiError::BadRequest(err.body_text()))?;

  let mut channel_id = None;
  let mut file: Option<Bytes> = None;
  while let Some(field) = multipart
    .next_field()
    .await
    .map_err(|err| ApiError::BadRequest(err.body_text()))?
  {
    let name = field.name().map(str::to_owned);
    match name.as_deref() {
      // camera_id 为旧客户端使用的字段名
      Some("channel_id") | Some("camera_id") => {
        let text = field
          .text()
          .await
          .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        let id = text
          .trim()
          .parse::<usize>()
          .map_err(|_| ApiError::BadRequest(format!("无效的通道编号: {:?}", text)))?;
        channel_id = Some(id);
      }
      Some("file") => {
        let data = field
          .bytes()
          .await
          .map_err(|err| ApiError::BadRequest(err.body_text()))?;
        file = Some(data);
      }
      _ => {}
    }
  }

  let channel_id = channel_id.ok_or_else(|| ApiError::BadRequest("缺少 channel_id 字段".into()))?;
  let file = file.ok_or_else(|| ApiError::BadRequest("缺少 file 字段".into()))?;

  let gateway = app.gateway.clone();
  let submission = tokio::task::spawn_blocking(move || gateway.submit(channel_id, &file)).await??;

  let response = match submission {
    Submission::Accepted { count } => {
      Json(json!({ "status": "success", "rocks_found": count })).into_response()
    }
    Submission::Dropped => (
      StatusCode::TOO_MANY_REQUESTS,
      Json(json!({ "status": "dropped", "message": "Busy" })),
    )
      .into_response(),
  };
  Ok(response)
}

async fn video_feed<M: Model + 'static>(
  State(app): State<Yanshi<M>>,
  Path(channel_id): Path<String>,
) -> impl IntoResponse {
  let (stream, _) = app.publisher.spawn(channel_id.parse::<usize>().ok());
  (
    [
      (header::CONTENT_TYPE, CONTENT_TYPE),
      (header::CACHE_CONTROL, "no-cache"),
    ],
    Body::from_stream(stream),
  )
}

async fn stats<M: Model + 'static>(State(app): State<Yanshi<M>>) -> impl IntoResponse {
  Json(json!({ "total_rocks": app.identities.count() }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{channel::ChannelError, frame::FrameError};

  #[derive(Error, Debug)]
  #[error("引擎不可用")]
  struct EngineDown;

  #[test]
  fn errors_map_to_status_and_single_log() {
    let inference = ApiError::from(IntakeError::InferenceFailure(Box::new(EngineDown)));
    assert_eq!(inference.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(inference.log_level(), None);

    let encode = ApiError::from(IntakeError::EncodeFailure(FrameError::Empty));
    assert_eq!(encode.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(encode.log_level(), Some(Level::ERROR));

    let channel = ApiError::from(IntakeError::InvalidChannel(ChannelError::OutOfRange {
      channel_id: 9,
      capacity: 5,
    }));
    assert_eq!(channel.status(), StatusCode::BAD_REQUEST);
    assert_eq!(channel.log_level(), Some(Level::WARN));

    let decode = ApiError::from(IntakeError::DecodeFailure(FrameError::Empty));
    assert_eq!(decode.status(), StatusCode::BAD_REQUEST);
    assert_eq!(ApiError::BadRequest("缺少 file 字段".into()).status(), StatusCode::BAD_REQUEST);
  }
}
