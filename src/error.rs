// Copyright 2025 Alejandro Martínez Corriá and the Thinkube contributors
// SPDX-License-Identifier: Apache-2.0

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BadgeError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Invalid registry URL: {0}")]
    InvalidRegistryUrl(String),
}

impl BadgeError {
    /// Status code of the badge response rendered for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            BadgeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BadgeError::PackageNotFound(_) => StatusCode::NOT_FOUND,
            BadgeError::HttpError(_) | BadgeError::JsonError(_) => StatusCode::BAD_GATEWAY,
            // Raised by stores and at startup only; never on a request path.
            BadgeError::CacheError(_) | BadgeError::InvalidRegistryUrl(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message text shown on the right-hand side of an error badge.
    pub fn badge_message(&self) -> &'static str {
        match self {
            BadgeError::BadRequest(_) => "Bad Request",
            BadgeError::PackageNotFound(_) => "Package not found.",
            BadgeError::HttpError(_) | BadgeError::JsonError(_) => "Upstream error",
            BadgeError::CacheError(_) | BadgeError::InvalidRegistryUrl(_) => "Internal error",
        }
    }
}

pub type Result<T> = std::result::Result<T, BadgeError>;
