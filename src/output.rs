// 该文件是 Yanshi （岩识） 项目的一部分。
// src/output.rs - 输出定义
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

use ab_glyph::FontArc;
use thiserror::Error;

pub mod draw;
mod placeholder;

pub use self::draw::Draw;
pub use self::placeholder::Placeholder;

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("无法加载嵌入的字体文件: {0}")]
  FontError(ab_glyph::InvalidFont),
}

/// 内置字体，标签与占位帧共用
pub fn embedded_font() -> Result<FontArc, OutputError> {
  let font_data: &'static [u8] = include_bytes!("../assets/DejaVuSans.ttf");
  FontArc::try_from_slice(font_data).map_err(OutputError::FontError)
}
