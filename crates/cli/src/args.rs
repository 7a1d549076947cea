use anyhow::{Context, Result};
use clap::Parser;
use intake_core::llm::{Dialect, Message};
use providers::IntakeConfig;
use std::{fs, path::PathBuf};

/// Stream one chat completion and print the client sequence as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "intake", version)]
pub struct Args {
    /// Wire dialect: openai-chat, openai-responses, anthropic or ollama
    #[arg(long)]
    pub dialect: Option<Dialect>,

    #[arg(long)]
    pub model: Option<String>,

    /// Override the dialect's base url
    #[arg(long)]
    pub base_url: Option<String>,

    /// System prompt placed before any history
    #[arg(long)]
    pub system: Option<String>,

    /// JSON array of prior `{role, content}` turns
    #[arg(long, value_name = "FILE.json")]
    pub history: Option<PathBuf>,

    /// Write logs here instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    pub prompt: String,
}

impl Args {
    /// Flags win over the environment and the config file.
    pub fn apply(&self, cfg: &mut IntakeConfig) {
        if let Some(m) = &self.model {
            cfg.model = m.clone();
        }
        if let Some(u) = &self.base_url {
            cfg.base_url = u.clone();
        }
    }

    pub fn conversation(&self) -> Result<Vec<Message>> {
        let mut msgs = Vec::new();
        if let Some(s) = &self.system {
            msgs.push(Message::system(s.as_str()));
        }
        if let Some(path) = &self.history {
            let data = fs::read(path)
                .with_context(|| format!("read history file: {}", path.display()))?;
            let past: Vec<Message> = serde_json::from_slice(&data)
                .with_context(|| format!("parse history json: {}", path.display()))?;
            msgs.extend(past);
        }
        msgs.push(Message::user(self.prompt.as_str()));
        Ok(msgs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::llm::Role;
    use providers::config::FileConfig;

    #[test]
    fn flags_parse_and_override_config() {
        let args = Args::try_parse_from([
            "intake",
            "--dialect",
            "anthropic",
            "--model",
            "claude-3-5-haiku-latest",
            "--base-url",
            "http://localhost:9000/v1",
            "hello",
        ])
        .unwrap();
        assert_eq!(args.dialect, Some(Dialect::Anthropic));

        let mut cfg =
            IntakeConfig::resolve(FileConfig::default(), args.dialect, |_: &str| None).unwrap();
        args.apply(&mut cfg);
        assert_eq!(cfg.model, "claude-3-5-haiku-latest");
        assert_eq!(cfg.base_url, "http://localhost:9000/v1");
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        assert!(Args::try_parse_from(["intake", "--dialect", "gopher", "hi"]).is_err());
    }

    #[test]
    fn conversation_orders_system_history_prompt() {
        let path = std::env::temp_dir().join(format!("intake-history-{}.json", std::process::id()));
        let history = r#"[{"role":"user","content":"a"},{"role":"assistant","content":"b"}]"#;
        fs::write(&path, history).unwrap();
        let args = Args::try_parse_from([
            "intake".to_string(),
            "--system".into(),
            "be brief".into(),
            "--history".into(),
            path.display().to_string(),
            "c".into(),
        ])
        .unwrap();
        let msgs = args.conversation().unwrap();
        fs::remove_file(&path).ok();

        let roles: Vec<Role> = msgs.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(msgs[3].content, "c");
    }

    #[test]
    fn bad_history_file_is_an_error() {
        let args =
            Args::try_parse_from(["intake", "--history", "/nonexistent/intake.json", "hi"])
                .unwrap();
        assert!(args.conversation().is_err());
    }
}
