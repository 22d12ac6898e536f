// Copyright 2025 Alejandro Martínez Corriá and the Thinkube contributors
// SPDX-License-Identifier: Apache-2.0

use crate::badge::{render_badge, BadgeColor, BadgeKind, BadgeStyle};
use crate::error::BadgeError;
use crate::format::format_downloads;
use crate::registry::{is_dot_segment, MetricsClient};
use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

const SVG_CONTENT_TYPE: &str = "image/svg+xml";

#[derive(Debug, Default, serde::Deserialize)]
pub struct BadgeQuery {
    pub style: Option<String>,
    pub color: Option<String>,
}

/// Route segments. Anything after the badge kind is ignored.
#[derive(Debug, serde::Deserialize)]
struct BadgePath {
    namespace: String,
    package: String,
    kind: String,
}

/// A fully resolved badge route.
#[derive(Debug, Clone, PartialEq)]
pub struct BadgeRequest {
    pub namespace: String,
    pub package_name: String,
    pub kind: BadgeKind,
    pub style: BadgeStyle,
    pub color: BadgeColor,
}

impl BadgeRequest {
    pub fn from_parts(
        namespace: &str,
        package_name: &str,
        kind: &str,
        query: &BadgeQuery,
    ) -> Result<Self, BadgeError> {
        if namespace.is_empty() || package_name.is_empty() {
            return Err(BadgeError::BadRequest(
                "Missing namespace or package name".to_string(),
            ));
        }
        if is_dot_segment(namespace) || is_dot_segment(package_name) {
            return Err(BadgeError::BadRequest(format!(
                "Invalid package path: {}/{}",
                namespace, package_name
            )));
        }
        let kind = BadgeKind::parse(kind)
            .ok_or_else(|| BadgeError::BadRequest(format!("Unknown badge type: {}", kind)))?;

        Ok(Self {
            namespace: namespace.to_string(),
            package_name: package_name.to_string(),
            kind,
            style: BadgeStyle::parse_or_default(query.style.as_deref()),
            color: BadgeColor::parse_or_default(query.color.as_deref()),
        })
    }

    /// Identifies the route, not the rendered content.
    pub fn etag(&self) -> String {
        format!(
            "\"{}-{}-{}\"",
            self.kind.as_str(),
            self.namespace,
            self.package_name
        )
    }
}

#[derive(Clone)]
pub struct BadgeServer {
    metrics: Arc<MetricsClient>,
}

impl BadgeServer {
    pub fn new(metrics: MetricsClient) -> Self {
        Self {
            metrics: Arc::new(metrics),
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/{namespace}/{package}/{kind}", get(badge_handler))
            .route("/{namespace}/{package}/{kind}/", get(badge_handler))
            .route("/{namespace}/{package}/{kind}/{*rest}", get(badge_handler))
            .fallback(bad_request_handler)
            .with_state(self)
    }

    async fn badge(&self, request: &BadgeRequest) -> Response {
        let policy = self.metrics.policy();

        let outcome = self
            .metrics
            .fetch_metrics(&request.namespace, &request.package_name)
            .await;

        match outcome {
            Ok(record) => {
                let message = match request.kind {
                    BadgeKind::Version => record.latest_version,
                    BadgeKind::Downloads => format_downloads(record.downloads),
                };
                let svg = render_badge(request.kind.as_str(), &message, &request.color, request.style);
                svg_response(
                    StatusCode::OK,
                    svg,
                    Some(format!("public, max-age={}", policy.found_ttl.as_secs())),
                    Some(request.etag()),
                )
            }
            Err(e) => {
                let cache_control = match &e {
                    BadgeError::PackageNotFound(_) => {
                        info!("Package not found: {}/{}", request.namespace, request.package_name);
                        format!("public, max-age={}", policy.not_found_ttl.as_secs())
                    }
                    _ => {
                        warn!(
                            "Failed to fetch metrics for {}/{}: {}",
                            request.namespace, request.package_name, e
                        );
                        "no-cache".to_string()
                    }
                };
                error_badge(&e, request.style, Some(cache_control), Some(request.etag()))
            }
        }
    }
}

async fn badge_handler(
    State(server): State<BadgeServer>,
    path: Result<Path<BadgePath>, PathRejection>,
    query: Result<Query<BadgeQuery>, QueryRejection>,
) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let Ok(Path(BadgePath {
        namespace,
        package,
        kind,
    })) = path
    else {
        let e = BadgeError::BadRequest("Malformed path".to_string());
        return error_badge(&e, BadgeStyle::parse_or_default(query.style.as_deref()), None, None);
    };

    match BadgeRequest::from_parts(&namespace, &package, &kind, &query) {
        Ok(request) => server.badge(&request).await,
        Err(e) => {
            info!("Rejected badge request /{}/{}/{}: {}", namespace, package, kind, e);
            error_badge(&e, BadgeStyle::parse_or_default(query.style.as_deref()), None, None)
        }
    }
}

async fn bad_request_handler(query: Result<Query<BadgeQuery>, QueryRejection>) -> Response {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let style = BadgeStyle::parse_or_default(query.style.as_deref());
    let e = BadgeError::BadRequest("Missing /version or /downloads".to_string());
    error_badge(&e, style, None, None)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "thunderstore-badge",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

fn error_badge(
    e: &BadgeError,
    style: BadgeStyle,
    cache_control: Option<String>,
    etag: Option<String>,
) -> Response {
    let status = e.status_code();
    let svg = render_badge(status.as_str(), e.badge_message(), &BadgeColor::RED, style);
    svg_response(status, svg, cache_control, etag)
}

fn svg_response(
    status: StatusCode,
    svg: String,
    cache_control: Option<String>,
    etag: Option<String>,
) -> Response {
    let mut response = (status, [(header::CONTENT_TYPE, SVG_CONTENT_TYPE)], svg).into_response();
    let headers = response.headers_mut();

    if let Some(value) = cache_control.and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Some(value) = etag.and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(header::ETAG, value);
    }

    response
}
