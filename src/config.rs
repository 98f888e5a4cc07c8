use dotenv::dotenv;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailBackend {
    Console,
    Smtp,
}

#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Which cross-origin callers may use the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigins {
    /// No cross-origin access. Used when `CORS_ALLOWED_ORIGINS` is unset.
    SameOrigin,
    /// `CORS_ALLOWED_ORIGINS=*`.
    Any,
    List(Vec<String>),
}

impl CorsOrigins {
    fn parse(raw: &str) -> Self {
        if raw.trim() == "*" {
            return CorsOrigins::Any;
        }
        let origins: Vec<String> = raw
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();
        if origins.is_empty() {
            CorsOrigins::SameOrigin
        } else {
            CorsOrigins::List(origins)
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub mongo_uri: String,
    pub database_name: String,
    pub media_root: PathBuf,
    pub media_url: String,
    /// Mount `media_root` at `media_url` in this server.
    pub serve_media: bool,
    pub template_dir: PathBuf,
    pub default_from_email: String,
    pub admin_email: String,
    pub email_backend: EmailBackend,
    pub smtp: Option<SmtpSettings>,
    pub email_max_attempts: u32,
    pub email_retry_backoff: Duration,
    pub max_upload_bytes: usize,
    pub cors_allowed_origins: CorsOrigins,
}

struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
    }

    fn or(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed_or<T: FromStr>(&self, name: &str, default: T) -> Result<T, AppError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid {}: {}", name, e))),
            None => Ok(default),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let vars = Vars { lookup };

        let email_backend = match vars.or("EMAIL_BACKEND", "console").to_lowercase().as_str() {
            "console" => EmailBackend::Console,
            "smtp" => EmailBackend::Smtp,
            other => {
                return Err(AppError::Config(format!(
                    "Invalid EMAIL_BACKEND '{}', expected 'console' or 'smtp'",
                    other
                )))
            }
        };

        let smtp = match vars.get("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                host,
                port: vars.parsed_or("SMTP_PORT", 587)?,
                username: vars.get("SMTP_USERNAME"),
                password: vars.get("SMTP_PASSWORD"),
            }),
            None if email_backend == EmailBackend::Smtp => {
                return Err(AppError::Config(
                    "SMTP_HOST is required when EMAIL_BACKEND=smtp".to_string(),
                ))
            }
            None => None,
        };

        let default_from_email = vars.or("DEFAULT_FROM_EMAIL", "noreply@example.com");
        let admin_email = vars.or("ADMIN_EMAIL", &default_from_email);

        let mut media_url = vars.or("MEDIA_URL", "/media/");
        if !media_url.ends_with('/') {
            media_url.push('/');
        }

        Ok(AppConfig {
            bind_address: vars.or("BIND_ADDRESS", "127.0.0.1:8080"),
            mongo_uri: vars.or("MONGODB_URI", "mongodb://localhost:27017"),
            database_name: vars.or("DATABASE_NAME", "store_db"),
            media_root: PathBuf::from(vars.or("MEDIA_ROOT", "./media")),
            media_url,
            serve_media: vars.parsed_or("SERVE_MEDIA", true)?,
            template_dir: PathBuf::from(vars.or("TEMPLATE_DIR", "./templates")),
            default_from_email,
            admin_email,
            email_backend,
            smtp,
            email_max_attempts: vars.parsed_or("EMAIL_MAX_ATTEMPTS", 3)?,
            email_retry_backoff: Duration::from_millis(
                vars.parsed_or("EMAIL_RETRY_BACKOFF_MS", 500)?,
            ),
            max_upload_bytes: vars.parsed_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?,
            cors_allowed_origins: CorsOrigins::parse(&vars.or("CORS_ALLOWED_ORIGINS", "")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(move |name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:8080");
        assert_eq!(config.database_name, "store_db");
        assert_eq!(config.media_url, "/media/");
        assert!(config.serve_media);
        assert_eq!(config.email_backend, EmailBackend::Console);
        assert_eq!(config.admin_email, "noreply@example.com");
        assert_eq!(config.email_max_attempts, 3);
        assert!(config.smtp.is_none());
        assert_eq!(config.cors_allowed_origins, CorsOrigins::SameOrigin);
    }

    #[test]
    fn reads_overrides() {
        let config = load(&[
            ("MEDIA_URL", "https://cdn.example.com/media"),
            ("SERVE_MEDIA", "false"),
            ("DEFAULT_FROM_EMAIL", "shop@example.com"),
            ("EMAIL_BACKEND", "SMTP"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_PORT", "2525"),
            ("EMAIL_RETRY_BACKOFF_MS", "20"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://shop.example.com,"),
        ])
        .unwrap();

        assert_eq!(config.media_url, "https://cdn.example.com/media/");
        assert!(!config.serve_media);
        assert_eq!(config.admin_email, "shop@example.com");
        assert_eq!(config.email_backend, EmailBackend::Smtp);
        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 2525);
        assert!(smtp.username.is_none());
        assert_eq!(config.email_retry_backoff, Duration::from_millis(20));
        assert_eq!(
            config.cors_allowed_origins,
            CorsOrigins::List(vec![
                "http://localhost:3000".into(),
                "https://shop.example.com".into()
            ])
        );
    }

    #[test]
    fn any_origin_must_be_asked_for() {
        assert_eq!(
            load(&[("CORS_ALLOWED_ORIGINS", " * ")]).unwrap().cors_allowed_origins,
            CorsOrigins::Any
        );
        assert_eq!(
            load(&[("CORS_ALLOWED_ORIGINS", " , ")]).unwrap().cors_allowed_origins,
            CorsOrigins::SameOrigin
        );
    }

    #[test]
    fn smtp_backend_needs_a_host() {
        let err = load(&[("EMAIL_BACKEND", "smtp")]).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn rejects_bad_numbers_and_backends() {
        assert!(matches!(
            load(&[("MAX_UPLOAD_BYTES", "lots")]),
            Err(AppError::Config(_))
        ));
        assert!(matches!(
            load(&[("EMAIL_BACKEND", "pigeon")]),
            Err(AppError::Config(_))
        ));
    }
}
