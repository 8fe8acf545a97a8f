//! Centralized error types for Nimbus.
//!
//! This module provides a typed error hierarchy that:
//! - Keeps the weather failure taxonomy closed and matchable
//! - Provides user-friendly messages suitable for display
//! - Preserves full error context for debugging/logging

use thiserror::Error;

/// Top-level application error type.
///
/// Use `user_message()` to get a display-appropriate message.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Weather service error: {0}")]
    Weather(#[from] WeatherError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    /// Recover typed config and IO failures from an anyhow chain.
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<ConfigError>() {
            Ok(e) => return AppError::Config(e),
            Err(err) => err,
        };
        match err.downcast::<std::io::Error>() {
            Ok(e) => AppError::Io(e),
            Err(err) => AppError::Other(err),
        }
    }
}

impl AppError {
    /// Returns a user-friendly message suitable for display.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::Config(e) => e.user_message(),
            AppError::Weather(e) => e.user_message(),
            AppError::Io(_) => "A file operation failed. Please try again.",
            AppError::Other(_) => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Configuration parse error: {0}")]
    ParseError(String),

    #[error("Missing required setting: {0}")]
    MissingSetting(String),
}

impl ConfigError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ConfigError::Invalid(_) => "Invalid configuration. Check your settings.",
            ConfigError::ParseError(_) => "Configuration file is malformed. Check your settings.",
            ConfigError::MissingSetting(_) => "A required setting is missing. Check your settings.",
        }
    }
}

/// Weather fetch failures.
///
/// This set is closed: every failed fetch produces exactly one of these.
/// Cancellation is not an error and has no variant here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    /// The endpoint could not be resolved to a URL.
    #[error("Invalid URL")]
    InvalidUrl,

    /// The transport succeeded but the response could not be read.
    #[error("Invalid response from server")]
    InvalidResponse,

    /// Non-2xx status. Carries the server's message or the status code.
    #[error("API error: {0}")]
    ApiError(String),

    /// The body did not decode into the expected shape.
    #[error("Invalid data received from server")]
    InvalidData,

    /// Timeout, DNS failure, connection reset and friends.
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Location services unavailable")]
    LocationUnavailable,

    #[error("Unknown error")]
    Unknown,
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::InvalidUrl => "Weather request could not be built. Check your settings.",
            WeatherError::InvalidResponse => {
                "Received an unexpected response. Please try again."
            }
            WeatherError::ApiError(_) => "Weather service error. Please try again.",
            WeatherError::InvalidData => "Weather data could not be read. Please try again.",
            WeatherError::NetworkError(_) => "Unable to connect. Check your internet connection.",
            WeatherError::LocationUnavailable => {
                "Location unavailable. Enable location access or search for a place."
            }
            WeatherError::Unknown => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Extension trait for converting reqwest errors to our error types.
pub trait ReqwestErrorExt {
    fn into_weather_error(self) -> WeatherError;
}

impl ReqwestErrorExt for reqwest::Error {
    fn into_weather_error(self) -> WeatherError {
        if self.is_builder() {
            WeatherError::InvalidUrl
        } else if self.is_decode() {
            WeatherError::InvalidData
        } else if self.is_timeout() {
            // The URL carries the API key; keep it out of messages and logs
            WeatherError::NetworkError(format!("request timed out: {}", self.without_url()))
        } else {
            WeatherError::NetworkError(self.without_url().to_string())
        }
    }
}
