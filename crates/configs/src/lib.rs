use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::time::Duration;
use tracing::warn;

pub const ENV_STORE_URL: &str = "KV_REST_API_URL";
pub const ENV_STORE_TOKEN: &str = "KV_REST_API_TOKEN";

pub const PLACEHOLDER_URL: &str = "https://placeholder.invalid";
pub const PLACEHOLDER_TOKEN: &str = "placeholder-token";

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, worker_threads: Some(4) }
    }
}

/// Which hash store implementation backs the story store.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Rest,
    Memory,
}

/// What to do at startup when the REST backend has no URL or token.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingCredentials {
    #[default]
    Fail,
    Placeholder,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub on_missing_credentials: MissingCredentials,
    /// Parse JSON-looking field values on read, like the hosted SDK does.
    /// Lossy: text fields holding `"null"` are dropped and `"1.50"` reads
    /// back as `"1.5"`.
    #[serde(default)]
    pub decode_values: bool,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

fn default_list_limit() -> usize { 100 }

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: String::new(),
            token: String::new(),
            on_missing_credentials: MissingCredentials::default(),
            decode_values: false,
            request_timeout_secs: None,
            list_limit: default_list_limit(),
        }
    }
}

pub fn config_path() -> String {
    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string())
}

pub fn load_default() -> Result<AppConfig> {
    load_from_file(&config_path())
}

pub fn load_from_file(path: &str) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<AppConfig> {
    let cfg: AppConfig = toml::from_str(content)?;
    Ok(cfg)
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl AppConfig {
    /// Load `config.toml` (or `CONFIG_PATH`), fill blanks from the
    /// environment and validate. A missing file means defaults + env.
    pub fn load_and_validate() -> Result<Self> {
        let path = config_path();
        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(content) => parse(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let mut cfg = AppConfig::default();
                cfg.server.apply_env(process_env);
                cfg
            }
            Err(e) => return Err(anyhow!("cannot read {path}: {e}")),
        };
        cfg.normalize_and_validate_with(process_env)?;
        Ok(cfg)
    }

    pub fn normalize_and_validate_with<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.server.normalize()?;
        // 若 TOML 中未提供 url/token，则尝试从环境变量填充
        self.store.normalize_from_env(&env);
        self.store.validate()?;
        Ok(())
    }
}

impl ServerConfig {
    /// Env overrides used when no config file exists.
    pub fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = env("SERVER_HOST") {
            self.host = host;
        }
        if let Some(port) = env("SERVER_PORT").and_then(|p| p.parse::<u16>().ok()) {
            self.port = port;
        }
        if let Some(w) = env("TOKIO_WORKER_THREADS").and_then(|v| v.parse::<usize>().ok()) {
            self.worker_threads = Some(w);
        }
    }

    fn normalize(&mut self) -> Result<()> {
        if self.host.trim().is_empty() {
            self.host = "127.0.0.1".to_string();
        }
        if self.port == 0 {
            return Err(anyhow!("server.port must be in 1..=65535"));
        }
        match self.worker_threads {
            Some(0) | None => self.worker_threads = Some(4),
            Some(_) => {}
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl StoreConfig {
    pub fn normalize_from_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.url.trim().is_empty() {
            if let Some(url) = env(ENV_STORE_URL) {
                self.url = url;
            }
        }
        if self.token.trim().is_empty() {
            if let Some(token) = env(ENV_STORE_TOKEN) {
                self.token = token;
            }
        }
    }

    /// Validate the store section. Missing REST credentials either fail here
    /// or get swapped for placeholders, depending on `on_missing_credentials`.
    pub fn validate(&mut self) -> Result<()> {
        if self.list_limit == 0 {
            return Err(anyhow!("store.list_limit must be >= 1"));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(anyhow!("store.request_timeout_secs must be a positive number of seconds"));
        }
        if self.backend == StoreBackend::Memory {
            return Ok(());
        }

        let missing: Vec<&str> = [
            (self.url.trim().is_empty(), ENV_STORE_URL),
            (self.token.trim().is_empty(), ENV_STORE_TOKEN),
        ]
        .into_iter()
        .filter_map(|(absent, name)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            match self.on_missing_credentials {
                MissingCredentials::Fail => {
                    return Err(anyhow!(
                        "store credentials missing ({}); set them in config.toml or the environment",
                        missing.join(", ")
                    ));
                }
                MissingCredentials::Placeholder => {
                    warn!(missing = %missing.join(", "), "store credentials missing; using placeholder endpoint, story operations will fail");
                    if self.url.trim().is_empty() {
                        self.url = PLACEHOLDER_URL.to_string();
                    }
                    if self.token.trim().is_empty() {
                        self.token = PLACEHOLDER_TOKEN.to_string();
                    }
                }
            }
        }

        let lower = self.url.to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return Err(anyhow!("store.url must start with http:// or https://"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn parses_full_config() {
        let cfg = parse(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000

            [store]
            backend = "rest"
            url = "https://kv.example.com"
            token = "secret"
            decode_values = true
            request_timeout_secs = 5
            list_limit = 20
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.server.bind_addr(), "0.0.0.0:9000");
        assert_eq!(cfg.store.backend, StoreBackend::Rest);
        assert!(cfg.store.decode_values);
        assert_eq!(cfg.store.request_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(cfg.store.list_limit, 20);
    }

    #[test]
    fn defaults_apply_for_empty_file() {
        let cfg = parse("").expect("parse");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.store.backend, StoreBackend::Rest);
        assert_eq!(cfg.store.on_missing_credentials, MissingCredentials::Fail);
        assert_eq!(cfg.store.list_limit, 100);
    }

    #[test]
    fn missing_credentials_fail_by_default() {
        let mut cfg = AppConfig::default();
        let err = cfg.normalize_and_validate_with(no_env).unwrap_err();
        assert!(err.to_string().contains(ENV_STORE_URL));
        assert!(err.to_string().contains(ENV_STORE_TOKEN));
    }

    #[test]
    fn missing_credentials_can_degrade_to_placeholders() {
        let mut cfg = AppConfig::default();
        cfg.store.on_missing_credentials = MissingCredentials::Placeholder;
        cfg.normalize_and_validate_with(no_env).expect("placeholder accepted");
        assert_eq!(cfg.store.url, PLACEHOLDER_URL);
        assert_eq!(cfg.store.token, PLACEHOLDER_TOKEN);
    }

    #[test]
    fn env_fills_blank_credentials_only() {
        let mut cfg = AppConfig::default();
        cfg.store.token = "from-file".into();
        cfg.normalize_and_validate_with(|name| match name {
            ENV_STORE_URL => Some("https://kv.example.com".into()),
            ENV_STORE_TOKEN => Some("from-env".into()),
            _ => None,
        })
        .expect("valid");
        assert_eq!(cfg.store.url, "https://kv.example.com");
        assert_eq!(cfg.store.token, "from-file");
    }

    #[test]
    fn memory_backend_needs_no_credentials() {
        let mut cfg = AppConfig::default();
        cfg.store.backend = StoreBackend::Memory;
        cfg.normalize_and_validate_with(no_env).expect("valid");
    }

    #[test]
    fn rejects_non_http_url_and_zero_limit() {
        let mut store = StoreConfig { url: "redis://x".into(), token: "t".into(), ..StoreConfig::default() };
        assert!(store.validate().is_err());

        let mut store = StoreConfig { list_limit: 0, ..StoreConfig::default() };
        assert!(store.validate().is_err());
    }

    #[test]
    fn server_env_overrides() {
        let mut server = ServerConfig::default();
        server.apply_env(|name| match name {
            "SERVER_HOST" => Some("0.0.0.0".into()),
            "SERVER_PORT" => Some("8181".into()),
            "TOKIO_WORKER_THREADS" => Some("nope".into()),
            _ => None,
        });
        assert_eq!(server.bind_addr(), "0.0.0.0:8181");
        assert_eq!(server.worker_threads, Some(4));
    }
}
