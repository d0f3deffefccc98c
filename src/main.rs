// 该文件是 Yanshi （岩识） 项目的一部分。
// src/main.rs - 服务主程序
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

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yanshi::{FromUrl, args::Args, model::Yolov8Builder, server::Yanshi};

// 视频流连接不会自行结束，收到中断信号后最多等待这么久
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();
  let config = args.service_config()?;

  info!("Yanshi 岩石检测服务");
  info!("模型地址: {}", args.model);
  info!("置信度阈值: {}", config.intake.confidence_threshold);
  info!("NMS 阈值: {}", args.nms_threshold);
  info!("通道数量: {}", config.max_channels);
  info!("视频流帧率上限: {}", config.stream.fps_cap);

  let model = Yolov8Builder::from_url(&args.model)
    .and_then(|builder| builder.nms_threshold(args.nms_threshold).build())
    .context("模型加载失败")?;

  let app = Yanshi::new(Arc::new(model), &config).context("无法初始化服务")?;

  let address = format!("{}:{}", args.host, args.port);
  let listener = tokio::net::TcpListener::bind(&address)
    .await
    .with_context(|| format!("无法监听 {}", address))?;
  info!("服务已启动: http://{}", address);

  axum::serve(listener, app.router())
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  info!("服务已退出");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(err) = tokio::signal::ctrl_c().await {
    warn!("无法监听中断信号: {}", err);
    std::future::pending::<()>().await;
  }

  info!("收到中断信号，准备退出...");
  tokio::spawn(async {
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    warn!("强制退出程序");
    std::process::exit(1);
  });
}
