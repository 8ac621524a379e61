//! Process configuration: optional TOML file, then environment overrides.

use std::path::Path;

use serde::Deserialize;

use haulbase_observability::LogFormat;

/// Used when no secret is configured. Never acceptable outside development.
pub const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub audit: AuditConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// In-memory stores when absent.
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
    pub token_ttl_hours: i64,
    pub inactivity_timeout_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: 24,
            inactivity_timeout_minutes: haulbase_auth::INACTIVITY_TIMEOUT_MINUTES,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: haulbase_infra::audit::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path {
            Some(path) => Self::from_toml_file(path)?,
            None => AppConfig::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str::<AppConfig>(contents).map_err(|e| ConfigError::ParseToml(e.to_string()))
    }

    /// Override file values with `HAULBASE_*` variables (and the bare
    /// `DATABASE_URL` / `JWT_SECRET` fallbacks).
    pub fn apply_env_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(v) = var("HAULBASE_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = var("HAULBASE_DATABASE_URL").or_else(|| var("DATABASE_URL")) {
            self.database.url = Some(v);
        }
        if let Some(n) = var("HAULBASE_DATABASE_MAX_CONNECTIONS").and_then(|v| v.parse().ok()) {
            self.database.max_connections = n;
        }
        if let Some(v) = var("HAULBASE_JWT_SECRET").or_else(|| var("JWT_SECRET")) {
            self.auth.jwt_secret = Some(v);
        }
        if let Some(n) = var("HAULBASE_TOKEN_TTL_HOURS").and_then(|v| v.parse().ok()) {
            self.auth.token_ttl_hours = n;
        }
        if let Some(n) = var("HAULBASE_INACTIVITY_TIMEOUT_MINUTES").and_then(|v| v.parse().ok()) {
            self.auth.inactivity_timeout_minutes = n;
        }
        if let Some(n) = var("HAULBASE_AUDIT_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.audit.queue_capacity = n;
        }
        if let Some(v) = var("HAULBASE_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Some(format) = var("HAULBASE_LOG_FORMAT").and_then(|v| v.parse().ok()) {
            self.log.format = format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret_or_default().is_empty() {
            return Err(ConfigError::Validation("auth.jwt_secret must not be empty".to_string()));
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(ConfigError::Validation("auth.token_ttl_hours must be positive".to_string()));
        }
        if self.auth.inactivity_timeout_minutes <= 0 {
            return Err(ConfigError::Validation(
                "auth.inactivity_timeout_minutes must be positive".to_string(),
            ));
        }
        if self.audit.queue_capacity == 0 {
            return Err(ConfigError::Validation("audit.queue_capacity must be non-zero".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn jwt_secret_or_default(&self) -> &str {
        self.auth.jwt_secret.as_deref().unwrap_or(DEV_JWT_SECRET)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.auth.jwt_secret.is_none()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.auth.inactivity_timeout_minutes, 30);
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert_eq!(config.log.format, LogFormat::Json);
        assert!(config.database.url.is_none());
        assert!(config.uses_dev_secret());
    }

    #[test]
    fn toml_sections_are_partial() {
        let config = AppConfig::from_toml_str(
            r#"
            [auth]
            jwt_secret = "from-file"

            [log]
            format = "pretty"
            "#,
        )
        .unwrap();

        assert_eq!(config.jwt_secret_or_default(), "from-file");
        assert_eq!(config.log.format, LogFormat::Pretty);
        assert_eq!(config.auth.token_ttl_hours, 24);
    }

    #[test]
    fn env_overrides_file_and_prefers_prefixed_names() {
        let mut config = AppConfig::from_toml_str("[auth]\njwt_secret = \"from-file\"\n").unwrap();
        config.apply_env_overrides(env(&[
            ("JWT_SECRET", "bare"),
            ("HAULBASE_JWT_SECRET", "prefixed"),
            ("DATABASE_URL", "postgres://localhost/haulbase"),
            ("HAULBASE_AUDIT_QUEUE_CAPACITY", "8"),
            ("HAULBASE_LOG_FORMAT", "nonsense"),
        ]));

        assert_eq!(config.jwt_secret_or_default(), "prefixed");
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/haulbase"));
        assert_eq!(config.audit.queue_capacity, 8);
        assert_eq!(config.log.format, LogFormat::Json);
    }

    #[test]
    fn validation_rejects_zero_values() {
        let mut config = AppConfig::default();
        config.auth.inactivity_timeout_minutes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = AppConfig::default();
        config.audit.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.auth.jwt_secret = Some(String::new());
        assert!(config.validate().is_err());
    }
}
