// 该文件是 Yanshi （岩识） 项目的一部分。
// src/channel.rs - 通道表
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

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use thiserror::Error;
use tracing::trace;

use crate::frame::JpegFrame;

pub const DEFAULT_MAX_CHANNELS: usize = 5;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
  #[error("通道 {channel_id} 超出范围 [0, {capacity})")]
  OutOfRange { channel_id: usize, capacity: usize },
}

#[derive(Debug, Default)]
struct ChannelSlot {
  busy: AtomicBool,
  // 锁只在克隆或替换 Bytes 句柄时持有
  frame: RwLock<Option<JpegFrame>>,
}

/// 固定容量的通道表
///
/// 每个通道持有一个忙标志和最新帧槽位，进程启动时一次性创建。
#[derive(Debug)]
pub struct ChannelTable {
  slots: Box<[ChannelSlot]>,
}

/// 通道占用凭证，析构时释放忙标志
#[derive(Debug)]
pub struct BusyGuard<'a> {
  channel_id: usize,
  slot: &'a ChannelSlot,
}

impl BusyGuard<'_> {
  pub fn channel_id(&self) -> usize {
    self.channel_id
  }
}

impl Drop for BusyGuard<'_> {
  fn drop(&mut self) {
    self.slot.busy.store(false, Ordering::Release);
    trace!("通道 {} 已释放", self.channel_id);
  }
}

impl Default for ChannelTable {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_CHANNELS)
  }
}

impl ChannelTable {
  pub fn new(capacity: usize) -> Self {
    let slots = (0..capacity).map(|_| ChannelSlot::default()).collect();
    Self { slots }
  }

  fn slot(&self, channel_id: usize) -> Result<&ChannelSlot, ChannelError> {
    self.slots.get(channel_id).ok_or(ChannelError::OutOfRange {
      channel_id,
      capacity: self.slots.len(),
    })
  }

  /// 尝试占用通道
  ///
  /// 通道空闲时返回 `Some(guard)`；已被占用时立即返回 `None`，不等待。
  pub fn try_acquire(&self, channel_id: usize) -> Result<Option<BusyGuard<'_>>, ChannelError> {
    let slot = self.slot(channel_id)?;
    let acquired = slot
      .busy
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_ok();

    // 失败时不能构造凭证，否则其析构会清掉持有者的忙标志
    Ok(acquired.then(|| BusyGuard { channel_id, slot }))
  }

  pub fn is_busy(&self, channel_id: usize) -> Result<bool, ChannelError> {
    Ok(self.slot(channel_id)?.busy.load(Ordering::Acquire))
  }

  /// 覆盖通道的最新帧，后写者胜出
  pub fn put(&self, channel_id: usize, frame: JpegFrame) -> Result<(), ChannelError> {
    let slot = self.slot(channel_id)?;
    let previous = slot.frame.write().replace(frame);
    // 旧帧在锁外释放
    drop(previous);
    Ok(())
  }

  /// 读取通道的最新帧；没有帧或通道不存在时返回 `None`
  pub fn get(&self, channel_id: usize) -> Option<JpegFrame> {
    self
      .slots
      .get(channel_id)
      .and_then(|slot| slot.frame.read().clone())
  }
}
