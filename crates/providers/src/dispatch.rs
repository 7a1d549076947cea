//! Request construction plus dialect selection. No network I/O happens here.

use crate::{anthropic, config::AccessConfig, ollama, openai};
use bytes::Bytes;
use intake_core::{
    demux::{Demultiplexer, NdjsonDemux, SseDemux},
    error::{IntakeError, ParseError},
    llm::{ChatOpts, Dialect, Message, Role},
    ops::NormalizedOp,
};
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

/// Maps one wire event's payload and optional name to normalized operations.
pub type EventParser = fn(&str, Option<&str>) -> Result<Vec<NormalizedOp>, ParseError>;

type RequestBuilder =
    fn(&AccessConfig, &ChatOpts, &[Message]) -> Result<DispatchRequest, IntakeError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatchRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

pub struct DispatchHandle {
    pub dialect: Dialect,
    pub request: DispatchRequest,
    pub demux: Box<dyn Demultiplexer>,
    pub parse: EventParser,
    /// Payload that marks logical completion, for dialects that have one.
    pub sentinel: Option<&'static str>,
}

struct DialectEntry {
    request: RequestBuilder,
    demux: fn() -> Box<dyn Demultiplexer>,
    parse: EventParser,
    sentinel: Option<&'static str>,
}

fn sse() -> Box<dyn Demultiplexer> {
    Box::new(SseDemux::new())
}

fn ndjson() -> Box<dyn Demultiplexer> {
    Box::new(NdjsonDemux::new())
}

fn entry(dialect: Dialect) -> DialectEntry {
    match dialect {
        Dialect::OpenAiChat => DialectEntry {
            request: openai::chat::request,
            demux: sse,
            parse: openai::chat::parse,
            sentinel: Some(openai::chat::DONE),
        },
        Dialect::OpenAiResponses => DialectEntry {
            request: openai::responses::request,
            demux: sse,
            parse: openai::responses::parse,
            sentinel: None,
        },
        Dialect::Anthropic => DialectEntry {
            request: anthropic::request,
            demux: sse,
            parse: anthropic::parse,
            sentinel: None,
        },
        Dialect::Ollama => DialectEntry {
            request: ollama::request,
            demux: ndjson,
            parse: ollama::parse,
            sentinel: None,
        },
    }
}

pub fn build(
    access: &AccessConfig,
    opts: &ChatOpts,
    history: &[Message],
) -> Result<DispatchHandle, IntakeError> {
    let e = entry(access.dialect);
    let request = (e.request)(access, opts, history)?;
    debug!(
        target: "providers::dispatch",
        dialect = %access.dialect,
        url = %request.url,
        "dispatch built"
    );
    Ok(DispatchHandle {
        dialect: access.dialect,
        request,
        demux: (e.demux)(),
        parse: e.parse,
        sentinel: e.sentinel,
    })
}

impl DispatchRequest {
    pub(crate) fn json(
        url: String,
        mut headers: BTreeMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<Self, IntakeError> {
        let body = serde_json::to_vec(body)
            .map_err(|e| IntakeError::prepare(format!("request body could not be encoded: {e}")))?;
        headers.insert("content-type".into(), "application/json".into());
        Ok(Self { url, headers, body: Bytes::from(body) })
    }
}

/// `base_url` joined with `path`; the base must be an absolute http(s) url.
pub(crate) fn endpoint(access: &AccessConfig, path: &str) -> Result<String, IntakeError> {
    let base = Url::parse(access.base_url.trim()).map_err(|e| {
        IntakeError::prepare(format!("invalid base url '{}': {e}", access.base_url))
    })?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(IntakeError::prepare(format!(
            "base url '{}' must use http or https",
            access.base_url
        )));
    }
    Ok(format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

pub(crate) fn api_key(access: &AccessConfig) -> Result<&str, IntakeError> {
    let key = access
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            IntakeError::prepare(format!("{} access requires an api key", access.dialect))
        })?;
    if key.chars().any(|c| c.is_control() || !c.is_ascii()) {
        return Err(IntakeError::prepare("api key contains characters not valid in a header"));
    }
    Ok(key)
}

pub(crate) fn check_model(model: &str) -> Result<&str, IntakeError> {
    let m = model.trim();
    if m.is_empty() {
        return Err(IntakeError::prepare("model identifier is empty"));
    }
    if m.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(IntakeError::prepare(format!("unsupported model identifier '{m}'")));
    }
    Ok(m)
}

/// At least one non-system turn with content must be present.
pub(crate) fn check_conversation(history: &[Message]) -> Result<(), IntakeError> {
    let has_turn = history
        .iter()
        .any(|m| m.role != Role::System && !m.content.trim().is_empty());
    if has_turn {
        Ok(())
    } else {
        Err(IntakeError::prepare("history has no user or assistant message to send"))
    }
}

/// Copy the sampling options that are set onto `body` under the given keys.
pub(crate) fn sampling(
    body: &mut serde_json::Value,
    opts: &ChatOpts,
    max_tokens_key: &str,
) {
    if let Some(map) = body.as_object_mut() {
        if let Some(t) = opts.temperature {
            map.insert("temperature".into(), serde_json::json!(t));
        }
        if let Some(p) = opts.top_p {
            map.insert("top_p".into(), serde_json::json!(p));
        }
        if let Some(n) = opts.max_tokens {
            map.insert(max_tokens_key.into(), serde_json::json!(n));
        }
    }
}
