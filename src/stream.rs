// 该文件是 Yanshi （岩识） 项目的一部分。
// src/stream.rs - MJPEG 视频流推送
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

use std::{convert::Infallible, sync::Arc, time::Duration};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::{
  channel::ChannelTable,
  frame::{DEFAULT_JPEG_QUALITY, JpegFrame},
  output::Placeholder,
};

pub const CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

pub type StreamChunk = Result<Bytes, Infallible>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
  pub fps_cap: f64,
  pub placeholder_retry: Duration,
  pub jpeg_quality: u8,
}

impl Default for StreamSettings {
  fn default() -> Self {
    Self {
      fps_cap: 20.0,
      placeholder_retry: Duration::from_secs(1),
      jpeg_quality: DEFAULT_JPEG_QUALITY,
    }
  }
}

// 帧间隔上限，帧率过小或非法时使用
const MAX_FRAME_INTERVAL: Duration = Duration::from_secs(3600);

impl StreamSettings {
  pub fn frame_interval(&self) -> Duration {
    Duration::try_from_secs_f64(1.0 / self.fps_cap)
      .map(|interval| interval.min(MAX_FRAME_INTERVAL))
      .unwrap_or(MAX_FRAME_INTERVAL)
  }
}

/// 将一帧 JPEG 包装为 multipart 片段
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
  let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
  part.put_slice(PART_HEADER);
  part.put_slice(jpeg);
  part.put_slice(b"\r\n");
  part.freeze()
}

/// 每个观看连接对应一个推送任务
///
/// 任务轮询通道的最新帧并写入有界队列；队列的接收端即响应体。
/// 观看者断开后响应体被丢弃，下一次发送失败时任务退出。
#[derive(Clone)]
pub struct StreamPublisher {
  channels: Arc<ChannelTable>,
  placeholder: Arc<Placeholder>,
  settings: StreamSettings,
}

impl StreamPublisher {
  pub fn new(channels: Arc<ChannelTable>, placeholder: Placeholder, settings: StreamSettings) -> Self {
    Self {
      channels,
      placeholder: Arc::new(placeholder),
      settings,
    }
  }

  /// 启动推送任务。`channel_id` 为 `None` 或超出范围时只推送占位帧。
  pub fn spawn(&self, channel_id: Option<usize>) -> (ReceiverStream<StreamChunk>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);
    let publisher = self.clone();
    let handle = tokio::spawn(publisher.run(channel_id, tx));
    (ReceiverStream::new(rx), handle)
  }

  async fn run(self, channel_id: Option<usize>, tx: mpsc::Sender<StreamChunk>) {
    debug!("通道 {:?} 的视频流已开始", channel_id);
    let interval = self.settings.frame_interval();

    loop {
      let current = channel_id.and_then(|id| self.channels.get(id));
      let idle = current.is_none();

      let frame = match current {
        Some(frame) => frame,
        None => match self.placeholder_frame().await {
          Some(frame) => frame,
          None => {
            if !wait_or_closed(&tx, self.settings.placeholder_retry).await {
              break;
            }
            continue;
          }
        },
      };

      if tx.send(Ok(multipart_part(frame.as_bytes()))).await.is_err() {
        break;
      }
      if idle && !wait_or_closed(&tx, self.settings.placeholder_retry).await {
        break;
      }
      if !wait_or_closed(&tx, interval).await {
        break;
      }
    }

    debug!("通道 {:?} 的观看者已断开，视频流结束", channel_id);
  }

  async fn placeholder_frame(&self) -> Option<JpegFrame> {
    let placeholder = self.placeholder.clone();
    match tokio::task::spawn_blocking(move || placeholder.encode()).await {
      Ok(Ok(frame)) => Some(frame),
      Ok(Err(err)) => {
        warn!("占位帧编码失败: {}", err);
        None
      }
      Err(err) => {
        warn!("占位帧生成任务异常: {}", err);
        None
      }
    }
  }
}

/// 等待指定时长；接收端关闭时提前返回 `false`
async fn wait_or_closed(tx: &mpsc::Sender<StreamChunk>, duration: Duration) -> bool {
  tokio::select! {
    _ = tokio::time::sleep(duration) => true,
    _ = tx.closed() => false,
  }
}
