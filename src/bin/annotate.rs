// 该文件是 Yanshi （岩识） 项目的一部分。
// src/bin/annotate.rs - 单张图像检测与标注
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

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use url::Url;

use yanshi::{
  FromUrl,
  identity::{AssignContext, IdentityStrategy, RandomIdentity},
  model::{Detection, Model, Yolov8Builder},
  output::{Draw, embedded_font},
};

/// 对单张图像运行检测并保存标注结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 yolov8:///models/best.onnx
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像路径
  #[arg(long, value_name = "INPUT")]
  pub input: PathBuf,
  /// 输出图像路径，格式由扩展名决定
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,
  /// 置信度阈值
  #[arg(long, default_value = "0.5")]
  pub confidence: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入图像: {}", args.input.display());
  info!("输出图像: {}", args.output.display());

  let model = Yolov8Builder::from_url(&args.model)?
    .build()
    .context("模型加载失败")?;
  let image = image::open(&args.input)
    .with_context(|| format!("无法读取图像 {}", args.input.display()))?
    .to_rgb8();

  info!("开始推理...");
  let now = std::time::Instant::now();
  let result = model.infer(&image, args.confidence)?;
  info!("推理完成，耗时: {:.2?}", now.elapsed());

  let strategy = RandomIdentity::default();
  let detections: Vec<Detection> = result
    .iter()
    .enumerate()
    .map(|(index, item)| Detection {
      id: strategy.assign(item, &AssignContext { channel_id: 0, index }),
      item: item.clone(),
    })
    .collect();

  for detection in &detections {
    let [x, y, w, h] = detection.item.bbox;
    info!(
      "  - Rock #{}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
      detection.id,
      detection.item.score * 100.0,
      x,
      y,
      w,
      h
    );
  }

  let annotated = Draw::new(embedded_font()?).annotate(&image, &detections);
  annotated
    .save(&args.output)
    .with_context(|| format!("无法保存图像 {}", args.output.display()))?;
  info!("检测到 {} 个目标，结果已保存", detections.len());

  Ok(())
}
