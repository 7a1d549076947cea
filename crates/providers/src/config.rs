use crate::pump::PumpOptions;
use anyhow::Context;
use directories::BaseDirs;
use intake_core::llm::{ChatOpts, Dialect};
use serde::Deserialize;
use std::{env, fmt, fs, path::Path, path::PathBuf, str::FromStr, time::Duration};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FileConfig {
    pub dialect: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub stream_idle_timeout_ms: Option<u64>,
    pub environment: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => anyhow::bail!("unknown environment '{other}'"),
        }
    }
}

/// Per-dialect access configuration consumed by the dispatch builder.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessConfig {
    pub dialect: Dialect,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl AccessConfig {
    pub fn new(dialect: Dialect, api_key: Option<String>) -> Self {
        Self {
            dialect,
            api_key,
            base_url: default_base_url(dialect).to_string(),
        }
    }

    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl fmt::Debug for AccessConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessConfig")
            .field("dialect", &self.dialect)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

pub fn default_base_url(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::OpenAiChat | Dialect::OpenAiResponses => "https://api.openai.com/v1",
        Dialect::Anthropic => "https://api.anthropic.com/v1",
        Dialect::Ollama => "http://localhost:11434",
    }
}

fn default_model(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::OpenAiChat => "gpt-4o-mini",
        Dialect::OpenAiResponses => "gpt-5",
        Dialect::Anthropic => "claude-3-5-sonnet-latest",
        Dialect::Ollama => "llama3.1",
    }
}

/// Environment variables holding the api key and base url override.
fn env_vars(dialect: Dialect) -> (Option<&'static str>, &'static str) {
    match dialect {
        Dialect::OpenAiChat | Dialect::OpenAiResponses => {
            (Some("OPENAI_API_KEY"), "OPENAI_BASE_URL")
        }
        Dialect::Anthropic => (Some("ANTHROPIC_API_KEY"), "ANTHROPIC_BASE_URL"),
        Dialect::Ollama => (None, "OLLAMA_HOST"),
    }
}

#[derive(Clone)]
pub struct IntakeConfig {
    pub dialect: Dialect,
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout: Duration,
    pub stream_idle_timeout: Option<Duration>,
    pub proxy: Option<String>,
    pub environment: Environment,
}

impl IntakeConfig {
    pub fn from_env_and_file() -> anyhow::Result<Self> {
        Self::load(None)
    }

    /// Like [`IntakeConfig::from_env_and_file`], with an explicit dialect
    /// taking precedence over the environment and the file.
    pub fn load(dialect: Option<Dialect>) -> anyhow::Result<Self> {
        let file = match Self::config_path() {
            Some(path) if path.exists() => Self::read_file(&path)?,
            _ => FileConfig::default(),
        };
        Self::resolve(file, dialect, |k| env::var(k).ok())
    }

    /// Layer `env` over `file` over built-in defaults.
    pub fn resolve<F>(file: FileConfig, dialect: Option<Dialect>, env: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let dialect = match dialect {
            Some(d) => d,
            None => match env("INTAKE_DIALECT").or(file.dialect) {
                Some(d) => d.parse::<Dialect>()?,
                None => Dialect::OpenAiChat,
            },
        };
        let (key_var, base_var) = env_vars(dialect);
        let api_key = key_var
            .and_then(|v| env(v))
            .filter(|k| !k.trim().is_empty());
        let base_url = env(base_var)
            .or(file.base_url)
            .unwrap_or_else(|| default_base_url(dialect).to_string());
        let model = env("INTAKE_MODEL")
            .or(file.model)
            .unwrap_or_else(|| default_model(dialect).to_string());
        let environment = match env("INTAKE_ENV").or(file.environment) {
            Some(e) => e.parse()?,
            None => Environment::default(),
        };
        let idle_ms = file.stream_idle_timeout_ms.unwrap_or(300_000);
        let proxy = env("HTTPS_PROXY").or_else(|| env("HTTP_PROXY"));

        Ok(IntakeConfig {
            dialect,
            api_key,
            base_url,
            model,
            max_tokens: file.max_tokens,
            temperature: file.temperature,
            timeout: Duration::from_millis(file.timeout_ms.unwrap_or(30_000)),
            stream_idle_timeout: (idle_ms > 0).then(|| Duration::from_millis(idle_ms)),
            proxy,
            environment,
        })
    }

    pub fn access(&self) -> AccessConfig {
        AccessConfig {
            dialect: self.dialect,
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
        }
    }

    pub fn chat_opts(&self) -> ChatOpts {
        ChatOpts {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: None,
            max_tokens: self.max_tokens,
        }
    }

    pub fn pump_options(&self) -> PumpOptions {
        PumpOptions {
            dev_diagnostics: self.environment == Environment::Development,
            idle_timeout: self.stream_idle_timeout,
        }
    }

    fn read_file(path: &Path) -> anyhow::Result<FileConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn config_path() -> Option<PathBuf> {
        let base = BaseDirs::new()?;
        let p = if cfg!(target_os = "windows") {
            base.home_dir().join(".intake").join("config.toml")
        } else {
            base.config_dir().join("intake").join("config.toml")
        };
        Some(p)
    }
}

impl fmt::Debug for IntakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntakeConfig")
            .field("dialect", &self.dialect)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("stream_idle_timeout", &self.stream_idle_timeout)
            .field("proxy", &self.proxy)
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_file_or_env() {
        let cfg = IntakeConfig::resolve(FileConfig::default(), None, env_of(&[])).unwrap();
        assert_eq!(cfg.dialect, Dialect::OpenAiChat);
        assert_eq!(cfg.base_url, "https://api.openai.com/v1");
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert_eq!(cfg.stream_idle_timeout, Some(Duration::from_secs(300)));
        assert_eq!(cfg.environment, Environment::Production);
        assert!(!cfg.pump_options().dev_diagnostics);
    }

    #[test]
    fn env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            dialect = "anthropic"
            model = "claude-3-haiku-20240307"
            environment = "production"
            stream_idle_timeout_ms = 0
            max_tokens = 256
            "#,
        )
        .unwrap();
        let cfg = IntakeConfig::resolve(
            file,
            None,
            env_of(&[
                ("ANTHROPIC_API_KEY", "sk-ant"),
                ("INTAKE_ENV", "dev"),
                ("HTTP_PROXY", "http://proxy:3128"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.dialect, Dialect::Anthropic);
        assert_eq!(cfg.model, "claude-3-haiku-20240307");
        assert_eq!(cfg.api_key.as_deref(), Some("sk-ant"));
        assert_eq!(cfg.base_url, "https://api.anthropic.com/v1");
        assert_eq!(cfg.stream_idle_timeout, None);
        assert_eq!(cfg.chat_opts().max_tokens, Some(256));
        assert_eq!(cfg.proxy.as_deref(), Some("http://proxy:3128"));
        assert!(cfg.pump_options().dev_diagnostics);
    }

    #[test]
    fn explicit_dialect_wins_and_picks_its_key() {
        let cfg = IntakeConfig::resolve(
            FileConfig { dialect: Some("anthropic".into()), ..FileConfig::default() },
            Some(Dialect::Ollama),
            env_of(&[("OPENAI_API_KEY", "sk"), ("OLLAMA_HOST", "http://gpu:11434")]),
        )
        .unwrap();
        assert_eq!(cfg.dialect, Dialect::Ollama);
        assert_eq!(cfg.api_key, None);
        assert_eq!(cfg.access().base_url, "http://gpu:11434");
    }

    #[test]
    fn blank_key_is_treated_as_missing() {
        let cfg = IntakeConfig::resolve(
            FileConfig::default(),
            None,
            env_of(&[("OPENAI_API_KEY", "  ")]),
        )
        .unwrap();
        assert_eq!(cfg.api_key, None);
    }

    #[test]
    fn unknown_dialect_or_environment_is_rejected() {
        assert!(IntakeConfig::resolve(
            FileConfig::default(),
            None,
            env_of(&[("INTAKE_DIALECT", "gemini")])
        )
        .is_err());
        assert!(IntakeConfig::resolve(
            FileConfig { environment: Some("staging".into()), ..FileConfig::default() },
            None,
            env_of(&[])
        )
        .is_err());
    }

    #[test]
    fn debug_output_redacts_key() {
        let access = AccessConfig::new(Dialect::OpenAiChat, Some("sk-secret".into()));
        let shown = format!("{access:?}");
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("<redacted>"));
    }
}
