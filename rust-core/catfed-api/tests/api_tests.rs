// SPDX-License-Identifier: PMPL-1.0-or-later
//! Integration tests for the catfed HTTP API
//!
//! In-process sources exercise routing and error mapping; a throwaway axum
//! catalog on a loopback port exercises the HTTP source adapter.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceExt;

use catfed_api::{build_router, ApiConfig, AppState, ErrorResponse, RegisteredSource};
use catfed_core::{
    FailureKind, HitCount, Metacard, PluginError, PreFederatedQueryPlugin, QueryRequest,
    QueryResponse, ResultRecord, Source, SourceError, SourceResponse,
};
use catfed_federation::FederationConfig;

struct Scored {
    id: &'static str,
    scores: Vec<f64>,
}

#[async_trait]
impl Source for Scored {
    fn id(&self) -> &str {
        self.id
    }

    async fn query(&self, _request: &QueryRequest) -> Result<SourceResponse, SourceError> {
        let records = self
            .scores
            .iter()
            .map(|s| ResultRecord::new(Metacard::new(format!("{}-{}", self.id, s), self.id)).with_relevance(*s))
            .collect::<Vec<_>>();
        let hits = records.len() as i64;
        Ok(SourceResponse::new(records, hits))
    }
}

struct Embargo;

#[async_trait]
impl PreFederatedQueryPlugin for Embargo {
    fn name(&self) -> &str {
        "embargo"
    }

    async fn process(
        &self,
        _source: &dyn Source,
        _request: &QueryRequest,
    ) -> Result<QueryRequest, PluginError> {
        Err(PluginError::StopProcessing("catalog under embargo".to_string()))
    }
}

fn state() -> AppState {
    let state = AppState::new(ApiConfig::default(), FederationConfig::default()).unwrap();
    state
        .federation
        .register(Arc::new(Scored { id: "north/a", scores: vec![5.0, 1.0] }), None)
        .unwrap();
    state
        .federation
        .register(Arc::new(Scored { id: "north/b", scores: vec![9.0] }), None)
        .unwrap();
    state
        .federation
        .register(Arc::new(Scored { id: "south/c", scores: vec![7.0] }), None)
        .unwrap();
    state
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn ids(response: &QueryResponse) -> Vec<&str> {
    response
        .results
        .iter()
        .map(|r| r.metacard.id.as_str())
        .collect()
}

#[tokio::test]
async fn test_sorted_query_over_pattern() {
    let app = build_router(state());

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/federation/query",
            json!({
                "sources": "north/*",
                "policy": "sorted",
                "query": { "filter": "anyText LIKE 'port'", "page_size": 2 }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: QueryResponse = body_json(response).await;
    assert_eq!(ids(&body), vec!["north/b-9", "north/a-5"]);
    assert_eq!(body.site_list, vec!["north/a", "north/b"]);
    assert_eq!(body.hits, HitCount::Known(3));
}

#[tokio::test]
async fn test_query_defaults_to_all_sources() {
    let app = build_router(state());

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/federation/query",
            json!({ "query": { "filter": "*" } }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: QueryResponse = body_json(response).await;
    assert_eq!(body.site_list.len(), 3);
    assert_eq!(body.results.len(), 4);
}

#[tokio::test]
async fn test_query_error_statuses() {
    let app = build_router(state());

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/federation/query",
            json!({ "sources": "west/*", "query": { "filter": "*" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let err: ErrorResponse = body_json(response).await;
    assert_eq!(err.code, 404);

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/federation/query",
            json!({ "query": { "filter": "*", "start_index": 0 } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stopping_plugin_is_forbidden() {
    let state = state();
    let federation = state.federation.clone().with_pre_plugin(Arc::new(Embargo));
    let app = build_router(state.with_federation(federation));

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/federation/query",
            json!({ "query": { "filter": "*" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_source_registration_lifecycle() {
    let app = build_router(AppState::new(ApiConfig::default(), FederationConfig::default()).unwrap());
    let registration = json!({
        "source_id": "archives/maritime",
        "endpoint": "http://127.0.0.1:9/catalog",
        "description": "Maritime archive"
    });

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/federation/sources", registration.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created: RegisteredSource = body_json(response).await;
    assert_eq!(created.endpoint.as_deref(), Some("http://127.0.0.1:9/catalog"));

    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/v1/federation/sources", registration))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/federation/sources")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let listed: Vec<RegisteredSource> = body_json(response).await;
    assert_eq!(listed.len(), 1);

    let delete = || {
        Request::builder()
            .method("DELETE")
            .uri("/api/v1/federation/sources/archives/maritime")
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.oneshot(delete()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_registration_is_rejected() {
    let app = build_router(AppState::new(ApiConfig::default(), FederationConfig::default()).unwrap());
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/federation/sources",
            json!({ "source_id": "has spaces", "endpoint": "http://127.0.0.1:9" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Serve `app` on an ephemeral loopback port and return its base URL.
async fn spawn_catalog(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn remote_catalog(Json(request): Json<QueryRequest>) -> Json<SourceResponse> {
    let records = (0..3)
        .map(|i| {
            let mut metacard = Metacard::new(format!("remote-{}", i), "");
            metacard.title = Some(request.query.filter().to_string());
            ResultRecord::new(metacard).with_relevance(f64::from(i))
        })
        .take(request.query.page_size().max(1) as usize)
        .collect();
    Json(SourceResponse::new(records, 3))
}

#[tokio::test]
async fn test_http_sources_end_to_end() {
    let healthy = spawn_catalog(Router::new().route("/query", post(remote_catalog))).await;
    let broken = spawn_catalog(Router::new().route(
        "/query",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "index corrupt") }),
    ))
    .await;
    let garbled = spawn_catalog(Router::new().route("/query", post(|| async { "not json" }))).await;

    let app = build_router(AppState::new(ApiConfig::default(), FederationConfig::default()).unwrap());
    for (id, endpoint, mask) in [
        ("remote/healthy", healthy, Some("public/catalog")),
        ("remote/broken", broken, None),
        ("remote/garbled", garbled, None),
    ] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/federation/sources",
                json!({ "source_id": id, "endpoint": endpoint, "mask_id": mask }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/v1/federation/query",
            json!({
                "policy": "sorted",
                "query": { "filter": "harbor", "page_size": 2, "timeout_ms": 5000 }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: QueryResponse = body_json(response).await;

    assert_eq!(ids(&body), vec!["remote-1", "remote-0"]);
    assert!(body
        .results
        .iter()
        .all(|r| r.metacard.source_id == "public/catalog" && r.metacard.title.as_deref() == Some("harbor")));
    assert_eq!(body.hits, HitCount::Known(3));

    let broken = body.processing_detail("remote/broken").unwrap();
    assert_eq!(broken.kind, FailureKind::Error);
    assert!(broken.message.contains("500"));

    let garbled = body.processing_detail("remote/garbled").unwrap();
    assert!(garbled.message.contains("invalid response"));
}
