// 该文件是 Yanshi （岩识） 项目的一部分。
// src/intake.rs - 检测请求入口
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

use std::{sync::Arc, time::Instant};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  channel::{ChannelError, ChannelTable},
  frame::{DEFAULT_JPEG_QUALITY, FrameError, JpegFrame, decode_image},
  identity::{AssignContext, IdentityStrategy, IdentityTracker, RandomIdentity},
  model::{Detection, Model},
  output::Draw,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntakeSettings {
  pub confidence_threshold: f32,
  pub jpeg_quality: u8,
}

impl Default for IntakeSettings {
  fn default() -> Self {
    Self {
      confidence_threshold: 0.5,
      jpeg_quality: DEFAULT_JPEG_QUALITY,
    }
  }
}

/// 一次提交的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
  /// 已处理，`count` 为本帧检测到的数量
  Accepted { count: usize },
  /// 通道正忙，帧被丢弃
  Dropped,
}

#[derive(Error, Debug)]
pub enum IntakeError {
  #[error("无效的通道: {0}")]
  InvalidChannel(ChannelError),
  #[error("图像解码失败: {0}")]
  DecodeFailure(FrameError),
  #[error("推理失败: {0}")]
  InferenceFailure(Box<dyn std::error::Error + Send + Sync>),
  #[error("标注帧编码失败: {0}")]
  EncodeFailure(FrameError),
}

impl From<ChannelError> for IntakeError {
  fn from(err: ChannelError) -> Self {
    IntakeError::InvalidChannel(err)
  }
}

/// 检测请求入口
///
/// 每个通道同一时刻只处理一个请求；通道忙时新请求直接丢弃，不排队。
pub struct IntakeGateway<M> {
  model: Arc<M>,
  channels: Arc<ChannelTable>,
  identities: Arc<IdentityTracker>,
  strategy: Arc<dyn IdentityStrategy>,
  draw: Draw,
  settings: IntakeSettings,
}

impl<M: Model> IntakeGateway<M> {
  pub fn new(
    model: Arc<M>,
    channels: Arc<ChannelTable>,
    identities: Arc<IdentityTracker>,
    draw: Draw,
    settings: IntakeSettings,
  ) -> Self {
    Self {
      model,
      channels,
      identities,
      strategy: Arc::new(RandomIdentity::default()),
      draw,
      settings,
    }
  }

  pub fn with_strategy(mut self, strategy: Arc<dyn IdentityStrategy>) -> Self {
    self.strategy = strategy;
    self
  }

  /// 处理一帧图像：解码、推理、标注并发布到通道
  ///
  /// 阻塞调用，推理可能耗时较长，异步环境中应放到阻塞线程池执行。
  pub fn submit(&self, channel_id: usize, image_bytes: &[u8]) -> Result<Submission, IntakeError> {
    let Some(guard) = self.channels.try_acquire(channel_id)? else {
      debug!("通道 {} 正忙，丢弃该帧", channel_id);
      return Ok(Submission::Dropped);
    };

    let now = Instant::now();
    let image = decode_image(image_bytes).map_err(IntakeError::DecodeFailure)?;

    let result = self
      .model
      .infer(&image, self.settings.confidence_threshold)
      .map_err(|err| {
        error!("通道 {} 推理失败: {}", channel_id, err);
        IntakeError::InferenceFailure(Box::new(err))
      })?;
    let elapsed_infer = now.elapsed();

    let detections: Vec<Detection> = result
      .iter()
      .enumerate()
      .map(|(index, item)| Detection {
        id: self
          .strategy
          .assign(item, &AssignContext { channel_id, index }),
        item: item.clone(),
      })
      .collect();

    let annotated = self.draw.annotate(&image, &detections);
    let frame =
      JpegFrame::encode(&annotated, self.settings.jpeg_quality).map_err(IntakeError::EncodeFailure)?;
    self.channels.put(guard.channel_id(), frame)?;

    for detection in &detections {
      self.identities.record(detection.id);
    }
    drop(guard);

    info!(
      "通道 {} 检测到 {} 个目标，耗时: {:.2?} / {:.2?}",
      channel_id,
      detections.len(),
      elapsed_infer,
      now.elapsed()
    );

    Ok(Submission::Accepted {
      count: detections.len(),
    })
  }
}
