use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail};

use solace_chat::completion::HttpBackendConfig;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
];

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,
    pub development: bool,
    pub llm: HttpBackendConfig,
    pub conversation_idle: chrono::Duration,
    pub crisis_keywords_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let parsed = |key: &str, default: u64| parse_or(key, var(key), default);

        let development = var("SOLACE_ENV").is_some_and(|v| v.eq_ignore_ascii_case("development"));

        let jwt_secret = match var("SOLACE_JWT_SECRET") {
            Some(secret) if development || !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => secret,
            Some(_) => bail!("SOLACE_JWT_SECRET is still a placeholder value"),
            None if development => DEV_SECRET.to_string(),
            None => bail!("SOLACE_JWT_SECRET is not set"),
        };

        let defaults = HttpBackendConfig::default();
        let llm = HttpBackendConfig {
            api_url: var("SOLACE_LLM_API_URL").unwrap_or(defaults.api_url),
            api_key: var("SOLACE_LLM_API_KEY"),
            model: var("SOLACE_LLM_MODEL").unwrap_or(defaults.model),
            max_tokens: parse_or("SOLACE_LLM_MAX_TOKENS", var("SOLACE_LLM_MAX_TOKENS"), 500)?,
            temperature: defaults.temperature,
            timeout: Duration::from_secs(parsed("SOLACE_LLM_TIMEOUT_SECS", 30)?),
        };

        Ok(Self {
            host: var("SOLACE_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or("SOLACE_PORT", var("SOLACE_PORT"), 3000)?,
            db_path: var("SOLACE_DB_PATH").unwrap_or_else(|| "solace.db".into()).into(),
            jwt_secret,
            access_token_ttl: minutes(parsed("SOLACE_ACCESS_TOKEN_MINUTES", 60)?),
            refresh_token_ttl: chrono::Duration::days(
                parsed("SOLACE_REFRESH_TOKEN_DAYS", 30)? as i64,
            ),
            development,
            llm,
            conversation_idle: minutes(parsed("SOLACE_CONVERSATION_IDLE_MINUTES", 120)?),
            crisis_keywords_path: var("SOLACE_CRISIS_KEYWORDS_PATH").map(PathBuf::from),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{} has invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

fn minutes(value: u64) -> chrono::Duration {
    chrono::Duration::minutes(value as i64)
}
