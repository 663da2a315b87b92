use std::str::FromStr;

use anyhow::{Context, Result};

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub s3_bucket: String,
    pub s3_endpoint: String,
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub openai_api_key: String,
    /// HS256 secret shared with the hosted auth backend.
    pub jwt_secret: String,
    /// Enables `POST /api/v1/credits/grant` when set.
    pub service_key: Option<String>,
    pub resend_api_key: Option<String>,
    pub email_from: String,
    pub port: u16,
    pub rust_log: String,
    pub analysis: AnalysisLimits,
}

/// Knobs for the CV analysis pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisLimits {
    /// Max concurrent model calls per analysis.
    pub concurrency: usize,
    pub max_cvs: usize,
    pub max_cv_bytes: usize,
    /// Request body limit for the multipart upload.
    pub max_upload_bytes: usize,
    pub excerpt_chars: usize,
    pub cache_ttl_days: i32,
    pub lock_ttl_secs: u64,
}

impl Default for AnalysisLimits {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_cvs: 50,
            max_cv_bytes: 5 * 1024 * 1024,
            max_upload_bytes: 100 * 1024 * 1024,
            excerpt_chars: 12_000,
            cache_ttl_days: 30,
            lock_ttl_secs: 900,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = AnalysisLimits::default();
        let analysis = AnalysisLimits {
            concurrency: optional_env("ANALYSIS_CONCURRENCY", defaults.concurrency)?.max(1),
            max_cvs: optional_env("MAX_CVS_PER_ANALYSIS", defaults.max_cvs)?,
            max_cv_bytes: optional_env("MAX_CV_BYTES", defaults.max_cv_bytes)?,
            max_upload_bytes: optional_env("MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            excerpt_chars: optional_env("EXCERPT_CHARS", defaults.excerpt_chars)?,
            cache_ttl_days: optional_env("CACHE_TTL_DAYS", defaults.cache_ttl_days)?,
            lock_ttl_secs: optional_env("ANALYSIS_LOCK_TTL_SECS", defaults.lock_ttl_secs)?,
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            s3_bucket: require_env("S3_BUCKET")?,
            s3_endpoint: require_env("S3_ENDPOINT")?,
            aws_access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
            aws_secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            openai_api_key: require_env("OPENAI_API_KEY")?,
            jwt_secret: require_env("JWT_SECRET")?,
            service_key: non_empty_env("SERVICE_KEY"),
            resend_api_key: non_empty_env("RESEND_API_KEY"),
            email_from: std::env::var("EMAIL_FROM")
                .unwrap_or_else(|_| "Screener <noreply@screener.local>".to_string()),
            port: optional_env("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            analysis,
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn optional_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optional_env_uses_default_when_unset() {
        let value: usize = optional_env("SCREENER_TEST_SURELY_UNSET", 7).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_optional_env_rejects_garbage() {
        std::env::set_var("SCREENER_TEST_BAD_NUMBER", "five");
        let result: Result<usize> = optional_env("SCREENER_TEST_BAD_NUMBER", 5);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_empty_env_treats_blank_as_unset() {
        std::env::set_var("SCREENER_TEST_BLANK", "   ");
        assert!(non_empty_env("SCREENER_TEST_BLANK").is_none());
    }

    #[test]
    fn test_default_limits_are_sane() {
        let limits = AnalysisLimits::default();
        assert!(limits.concurrency >= 1);
        assert!(limits.max_cv_bytes < limits.max_upload_bytes);
    }
}
