// 该文件是 Yanshi （岩识） 项目的一部分。
// src/identity.rs - 身份分配与计数
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

use std::{collections::HashSet, ops::RangeInclusive};

use parking_lot::Mutex;
use rand::Rng;

use crate::model::DetectItem;

/// 分配身份时可用的上下文
#[derive(Debug, Clone, Copy)]
pub struct AssignContext {
  pub channel_id: usize,
  /// 检测结果在本帧中的序号
  pub index: usize,
}

/// 身份分配策略
///
/// 默认实现不做跨帧关联，同一物体在不同帧里会得到不同的编号，
/// 因此累计数量会偏大。替换为基于位置或时序的匹配时，只需实现本 trait。
pub trait IdentityStrategy: Send + Sync {
  fn assign(&self, detection: &DetectItem, context: &AssignContext) -> u64;
}

/// 每个检测随机分配一个编号
#[derive(Debug, Clone)]
pub struct RandomIdentity {
  range: RangeInclusive<u64>,
}

impl Default for RandomIdentity {
  fn default() -> Self {
    Self { range: 1000..=9999 }
  }
}

impl RandomIdentity {
  pub fn with_range(range: RangeInclusive<u64>) -> Self {
    Self { range }
  }
}

impl IdentityStrategy for RandomIdentity {
  fn assign(&self, _detection: &DetectItem, _context: &AssignContext) -> u64 {
    rand::thread_rng().gen_range(self.range.clone())
  }
}

/// 已发现物体编号的集合，只增不减
#[derive(Debug, Default)]
pub struct IdentityTracker {
  ids: Mutex<HashSet<u64>>,
}

impl IdentityTracker {
  pub fn new() -> Self {
    Self::default()
  }

  /// 记录编号，首次出现时返回 `true`
  pub fn record(&self, id: u64) -> bool {
    self.ids.lock().insert(id)
  }

  pub fn count(&self) -> usize {
    self.ids.lock().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[test]
  fn duplicate_ids_count_once() {
    let tracker = IdentityTracker::new();
    assert_eq!(tracker.count(), 0);
    assert!(tracker.record(4242));
    assert!(!tracker.record(4242));
    assert_eq!(tracker.count(), 1);
  }

  #[test]
  fn concurrent_distinct_ids_are_not_lost() {
    const THREADS: u64 = 8;
    const PER_THREAD: u64 = 500;
    let tracker = Arc::new(IdentityTracker::new());

    let handles: Vec<_> = (0..THREADS)
      .map(|t| {
        let tracker = tracker.clone();
        std::thread::spawn(move || {
          for i in 0..PER_THREAD {
            tracker.record(t * PER_THREAD + i);
          }
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(tracker.count(), (THREADS * PER_THREAD) as usize);
  }

  #[test]
  fn random_identity_stays_in_range() {
    let strategy = RandomIdentity::default();
    let detection = DetectItem {
      class_id: 0,
      score: 0.9,
      bbox: [0.0, 0.0, 1.0, 1.0],
    };
    for index in 0..200 {
      let id = strategy.assign(
        &detection,
        &AssignContext {
          channel_id: 0,
          index,
        },
      );
      assert!((1000..=9999).contains(&id));
    }

    let fixed = RandomIdentity::with_range(7..=7);
    let context = AssignContext {
      channel_id: 3,
      index: 0,
    };
    assert_eq!(fixed.assign(&detection, &context), 7);
  }
}
