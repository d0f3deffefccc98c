// 该文件是 Yanshi （岩识） 项目的一部分。
// tests/http_api.rs - HTTP 接口集成测试
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

mod common;

use std::{sync::Arc, time::Duration};

use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use bytes::Bytes;
use futures::StreamExt;
use serde_json::json;
use tokio::time::timeout;
use tower::ServiceExt;

use common::{
  Form, ScriptedModel, app, detect_request, json_body, png_bytes, rock, test_config,
};
use yanshi::{
  frame::DEFAULT_JPEG_QUALITY,
  identity::RandomIdentity,
  output::{Placeholder, embedded_font},
  server::Yanshi,
  stream::multipart_part,
};

fn stats_request() -> Request<Body> {
  Request::get("/stats").body(Body::empty()).unwrap()
}

fn feed_request(channel_id: &str) -> Request<Body> {
  Request::get(format!("/video_feed/{}", channel_id))
    .body(Body::empty())
    .unwrap()
}

fn placeholder_part() -> Bytes {
  let placeholder = Placeholder::new(embedded_font().unwrap(), DEFAULT_JPEG_QUALITY);
  multipart_part(placeholder.encode().unwrap().as_bytes())
}

#[tokio::test]
async fn detect_then_stats_counts_rock() {
  let model = Arc::new(ScriptedModel::returning(vec![rock(0.7, [10.0, 20.0, 30.0, 40.0])]));
  let (_, router) = app(model);

  let response = router.clone().oneshot(stats_request()).await.unwrap();
  assert_eq!(json_body(response).await, json!({ "total_rocks": 0 }));

  let response = router
    .clone()
    .oneshot(detect_request("0", &png_bytes()))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    json_body(response).await,
    json!({ "status": "success", "rocks_found": 1 })
  );

  let response = router.oneshot(stats_request()).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(json_body(response).await, json!({ "total_rocks": 1 }));
}

#[tokio::test]
async fn low_confidence_detections_are_filtered() {
  let model = Arc::new(ScriptedModel::returning(vec![
    rock(0.7, [10.0, 20.0, 30.0, 40.0]),
    rock(0.2, [100.0, 100.0, 30.0, 40.0]),
  ]));
  let (app, router) = app(model);

  let response = router
    .oneshot(detect_request("1", &png_bytes()))
    .await
    .unwrap();
  assert_eq!(
    json_body(response).await,
    json!({ "status": "success", "rocks_found": 1 })
  );
  assert_eq!(app.identities().count(), 1);
}

#[tokio::test]
async fn camera_id_is_accepted_as_channel_alias() {
  let model = Arc::new(ScriptedModel::returning(Vec::new()));
  let (_, router) = app(model);

  let request = Form::new()
    .text("camera_id", "4")
    .file("file", &png_bytes())
    .into_request();
  let response = router.oneshot(request).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    json_body(response).await,
    json!({ "status": "success", "rocks_found": 0 })
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_channel_drops_requests_until_first_finishes() {
  let model = Arc::new(ScriptedModel::gated(vec![rock(0.9, [5.0, 5.0, 20.0, 20.0])]));
  let gate = model.gate.clone().unwrap();
  let (_, router) = app(model);
  let png = png_bytes();

  let first = tokio::spawn(router.clone().oneshot(detect_request("2", &png)));

  let entered = gate.clone();
  tokio::task::spawn_blocking(move || entered.entered.wait())
    .await
    .unwrap();

  // 第一个请求仍在推理，之后的每个请求都被丢弃
  for _ in 0..2 {
    let response = router
      .clone()
      .oneshot(detect_request("2", &png))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
      json_body(response).await,
      json!({ "status": "dropped", "message": "Busy" })
    );
  }

  let release = gate.clone();
  tokio::task::spawn_blocking(move || release.release.wait())
    .await
    .unwrap();

  let response = first.await.unwrap().unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    json_body(response).await,
    json!({ "status": "success", "rocks_found": 1 })
  );
}

#[tokio::test]
async fn unparsable_image_is_rejected_and_channel_recovers() {
  let model = Arc::new(ScriptedModel::returning(vec![rock(0.7, [10.0, 20.0, 30.0, 40.0])]));
  let (_, router) = app(model);

  let response = router
    .clone()
    .oneshot(detect_request("0", b"\x00\x01garbage"))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  assert_eq!(json_body(response).await, json!({ "status": "error" }));

  let response = router
    .oneshot(detect_request("0", &png_bytes()))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(json_body(response).await["status"], "success");
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
  let model = Arc::new(ScriptedModel::returning(Vec::new()));
  let (app, router) = app(model);
  let png = png_bytes();

  let requests = vec![
    detect_request("5", &png),
    detect_request("-1", &png),
    detect_request("abc", &png),
    Form::new().file("file", &png).into_request(),
    Form::new().text("channel_id", "0").into_request(),
    Request::post("/detect")
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from("{}"))
      .unwrap(),
  ];

  for request in requests {
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await, json!({ "status": "error" }));
  }
  assert_eq!(app.identities().count(), 0);
}

#[tokio::test]
async fn engine_failure_is_internal_error() {
  let model = Arc::new(ScriptedModel::failing());
  let (_, router) = app(model);

  let response = router
    .clone()
    .oneshot(detect_request("3", &png_bytes()))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
  let body = json_body(response).await;
  assert_eq!(body["status"], "error");
  assert!(body["message"].is_string());

  // 服务继续可用
  let response = router.oneshot(stats_request()).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn video_feed_switches_from_placeholder_to_frame() {
  let model = Arc::new(ScriptedModel::returning(vec![rock(0.7, [10.0, 20.0, 30.0, 40.0])]));
  let (_, router) = app(model);
  let placeholder = placeholder_part();

  let response = router.clone().oneshot(feed_request("0")).await.unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response.headers()[header::CONTENT_TYPE],
    "multipart/x-mixed-replace; boundary=frame"
  );
  let mut parts = response.into_body().into_data_stream();

  for _ in 0..2 {
    let part = timeout(Duration::from_secs(5), parts.next())
      .await
      .unwrap()
      .unwrap()
      .unwrap();
    assert_eq!(part, placeholder);
  }

  let response = router
    .oneshot(detect_request("0", &png_bytes()))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let mut annotated = None;
  for _ in 0..10 {
    let part = timeout(Duration::from_secs(5), parts.next())
      .await
      .unwrap()
      .unwrap()
      .unwrap();
    if part != placeholder {
      annotated = Some(part);
      break;
    }
  }
  let annotated = annotated.expect("未收到标注帧");
  assert!(annotated.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
  assert!(annotated.ends_with(b"\r\n"));
}

#[tokio::test]
async fn video_feed_for_unknown_channel_serves_placeholder() {
  let model = Arc::new(ScriptedModel::returning(Vec::new()));
  let (_, router) = app(model);
  let placeholder = placeholder_part();

  for channel_id in ["99", "lobby"] {
    let response = router.clone().oneshot(feed_request(channel_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut parts = response.into_body().into_data_stream();
    let part = timeout(Duration::from_secs(5), parts.next())
      .await
      .unwrap()
      .unwrap()
      .unwrap();
    assert_eq!(part, placeholder);
  }
}

#[tokio::test]
async fn custom_identity_strategy_deduplicates_stats() {
  let model = Arc::new(ScriptedModel::returning(vec![rock(0.8, [1.0, 1.0, 10.0, 10.0])]));
  let strategy = Arc::new(RandomIdentity::with_range(7..=7));
  let router = Yanshi::with_strategy(model, &test_config(), strategy)
    .unwrap()
    .router();

  for channel_id in ["0", "1"] {
    let response = router
      .clone()
      .oneshot(detect_request(channel_id, &png_bytes()))
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  let response = router.oneshot(stats_request()).await.unwrap();
  assert_eq!(json_body(response).await, json!({ "total_rocks": 1 }));
}
