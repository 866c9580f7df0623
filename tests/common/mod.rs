//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use subdomain_router::config::{ContentEntryConfig, RouterConfig, TenantConfig};
use subdomain_router::content::ContentKind;
use subdomain_router::http::AppState;
use subdomain_router::store::connect_in_memory;
use subdomain_router::HttpServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const ADMIN_KEY: &str = "test-admin-key";

/// Start an upstream that answers every request with
/// `upstream saw: <request line> host=<host>`.
pub async fn start_echo_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]).to_string();
                let request_line = head.lines().next().unwrap_or_default().to_string();
                let host = head
                    .lines()
                    .find_map(|l| l.strip_prefix("host: ").or_else(|| l.strip_prefix("Host: ")))
                    .unwrap_or_default()
                    .to_string();

                let body = format!("upstream saw: {request_line} host={host}");
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn entry(id: i64, slug: &str, kind: ContentKind, published: bool) -> ContentEntryConfig {
    ContentEntryConfig {
        id,
        slug: slug.into(),
        kind,
        published,
        public: true,
        path: None,
    }
}

/// One tenant on `example.com` with a small content catalog.
pub fn single_site(upstream: SocketAddr) -> RouterConfig {
    let mut config = RouterConfig::default();
    config.admin.api_key = ADMIN_KEY.into();
    config.network.tenants = vec![TenantConfig {
        id: 1,
        name: "Example".into(),
        site_url: "https://example.com".into(),
        upstream: upstream.to_string(),
        domains: vec!["example.org".into()],
        front_page_id: Some(1),
        content: vec![
            entry(1, "home", ContentKind::Page, true),
            entry(42, "box-office", ContentKind::Page, true),
            entry(7, "about", ContentKind::Page, true),
            entry(9, "draft", ContentKind::Post, false),
        ],
    }];
    config
}

pub async fn server(config: RouterConfig) -> (Router, AppState) {
    let pool = connect_in_memory().await.unwrap();
    let server = HttpServer::new(config, pool).await.unwrap();
    (server.router(), server.state())
}

pub fn get(host: &str, path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header("host", host)
        .header("user-agent", "integration-test")
        .body(Body::empty())
        .unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
