// 该文件是 Yanshi （岩识） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use url::Url;

use crate::{
  channel::DEFAULT_MAX_CHANNELS, frame::DEFAULT_JPEG_QUALITY, intake::IntakeSettings,
  stream::StreamSettings,
};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;
const STREAM_FPS_RANGE: std::ops::RangeInclusive<f64> = 0.01..=1000.0;

/// Yanshi 服务参数配置
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolov8:///models/best.onnx
  #[arg(long, env = "YANSHI_MODEL", value_name = "MODEL")]
  pub model: Url,

  /// 监听地址
  #[arg(long, env = "YANSHI_HOST", default_value = "0.0.0.0")]
  pub host: String,

  /// 监听端口
  #[arg(long, env = "YANSHI_PORT", default_value = "8000")]
  pub port: u16,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, env = "CONFIDENCE_THRESHOLD", default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, env = "NMS_THRESHOLD", default_value = "0.45", value_name = "THRESHOLD")]
  pub nms_threshold: f32,

  /// 摄像头通道数量
  #[arg(long, env = "MAX_CHANNELS", default_value_t = DEFAULT_MAX_CHANNELS)]
  pub max_channels: usize,

  /// 视频流最大帧率
  #[arg(long, env = "STREAM_FPS_CAP", default_value = "20.0", value_name = "FPS")]
  pub stream_fps_cap: f64,

  /// 无数据时的重试间隔（毫秒）
  #[arg(long, env = "PLACEHOLDER_RETRY_MS", default_value = "1000", value_name = "MILLIS")]
  pub placeholder_retry_ms: u64,

  /// 标注帧的 JPEG 质量 (1 - 100)
  #[arg(long, env = "JPEG_QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
  pub jpeg_quality: u8,

  /// 上传图像的最大字节数
  #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
  pub max_upload_bytes: usize,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("置信度阈值必须在 [0, 1] 之间, 实际为 {0}")]
  InvalidConfidence(f32),
  #[error("NMS 阈值必须在 [0, 1] 之间, 实际为 {0}")]
  InvalidNmsThreshold(f32),
  #[error("通道数量必须大于 0")]
  NoChannels,
  #[error("视频流帧率必须在 [0.01, 1000] 之间, 实际为 {0}")]
  InvalidFps(f64),
  #[error("JPEG 质量必须在 1 到 100 之间, 实际为 {0}")]
  InvalidJpegQuality(u8),
  #[error("上传大小限制不能为 0")]
  InvalidUploadLimit,
}

/// 校验后的服务配置
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
  pub max_channels: usize,
  pub intake: IntakeSettings,
  pub stream: StreamSettings,
  pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
  fn default() -> Self {
    Self {
      max_channels: DEFAULT_MAX_CHANNELS,
      intake: IntakeSettings::default(),
      stream: StreamSettings::default(),
      max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
    }
  }
}

impl Args {
  pub fn service_config(&self) -> Result<ServiceConfig, ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence) {
      return Err(ConfigError::InvalidConfidence(self.confidence));
    }
    if !(0.0..=1.0).contains(&self.nms_threshold) {
      return Err(ConfigError::InvalidNmsThreshold(self.nms_threshold));
    }
    if self.max_channels == 0 {
      return Err(ConfigError::NoChannels);
    }
    if !STREAM_FPS_RANGE.contains(&self.stream_fps_cap) {
      return Err(ConfigError::InvalidFps(self.stream_fps_cap));
    }
    if !(1..=100).contains(&self.jpeg_quality) {
      return Err(ConfigError::InvalidJpegQuality(self.jpeg_quality));
    }
    if self.max_upload_bytes == 0 {
      return Err(ConfigError::InvalidUploadLimit);
    }

    Ok(ServiceConfig {
      max_channels: self.max_channels,
      intake: IntakeSettings {
        confidence_threshold: self.confidence,
        jpeg_quality: self.jpeg_quality,
      },
      stream: StreamSettings {
        fps_cap: self.stream_fps_cap,
        placeholder_retry: Duration::from_millis(self.placeholder_retry_ms),
        jpeg_quality: self.jpeg_quality,
      },
      max_upload_bytes: self.max_upload_bytes,
    })
  }
}
