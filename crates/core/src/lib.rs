pub mod decode;
pub mod demux;
pub mod error;
pub mod ops;

pub mod llm {
    use serde::{Deserialize, Serialize};
    use std::{fmt, str::FromStr};

    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
        System,
    }

    impl Role {
        pub fn as_str(self) -> &'static str {
            match self {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            }
        }
    }

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    pub struct Message {
        pub role: Role,
        pub content: String,
    }

    impl Message {
        pub fn user<S: Into<String>>(s: S) -> Self {
            Self { role: Role::User, content: s.into() }
        }
        pub fn assistant<S: Into<String>>(s: S) -> Self {
            Self { role: Role::Assistant, content: s.into() }
        }
        pub fn system<S: Into<String>>(s: S) -> Self {
            Self { role: Role::System, content: s.into() }
        }
    }

    /// Model selection plus the sampling knobs every dialect understands.
    #[derive(Clone, Debug, Default)]
    pub struct ChatOpts {
        pub model: String,
        pub temperature: Option<f32>,
        pub top_p: Option<f32>,
        pub max_tokens: Option<u32>,
    }

    impl ChatOpts {
        pub fn new<S: Into<String>>(model: S) -> Self {
            Self { model: model.into(), ..Self::default() }
        }
    }

    /// Vendor wire protocol a request is dispatched with.
    #[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
    #[serde(rename_all = "kebab-case")]
    pub enum Dialect {
        OpenAiChat,
        OpenAiResponses,
        Anthropic,
        Ollama,
    }

    impl Dialect {
        pub const ALL: [Dialect; 4] = [
            Dialect::OpenAiChat,
            Dialect::OpenAiResponses,
            Dialect::Anthropic,
            Dialect::Ollama,
        ];

        pub fn as_str(self) -> &'static str {
            match self {
                Dialect::OpenAiChat => "openai-chat",
                Dialect::OpenAiResponses => "openai-responses",
                Dialect::Anthropic => "anthropic",
                Dialect::Ollama => "ollama",
            }
        }
    }

    impl fmt::Display for Dialect {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.as_str())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    #[error("unknown dialect '{0}'")]
    pub struct UnknownDialect(pub String);

    impl FromStr for Dialect {
        type Err = UnknownDialect;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "openai-chat" | "chat" => Ok(Dialect::OpenAiChat),
                "openai-responses" | "responses" => Ok(Dialect::OpenAiResponses),
                "anthropic" => Ok(Dialect::Anthropic),
                "ollama" => Ok(Dialect::Ollama),
                other => Err(UnknownDialect(other.to_string())),
            }
        }
    }

}
