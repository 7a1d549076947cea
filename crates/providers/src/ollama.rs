//! Ollama `/api/chat`: newline-delimited JSON, `done: true` closes.

use crate::config::AccessConfig;
use crate::dispatch::{self, DispatchRequest};
use intake_core::{
    error::{IntakeError, ParseError},
    llm::{ChatOpts, Message},
    ops::NormalizedOp,
};
use serde_json::Value;
use std::collections::BTreeMap;

pub(crate) fn request(
    access: &AccessConfig,
    opts: &ChatOpts,
    history: &[Message],
) -> Result<DispatchRequest, IntakeError> {
    let model = dispatch::check_model(&opts.model)?;
    dispatch::check_conversation(history)?;
    let url = dispatch::endpoint(access, "api/chat")?;

    let messages: Vec<Value> = history
        .iter()
        .map(|m| serde_json::json!({"role": m.role.as_str(), "content": m.content}))
        .collect();
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    let mut options = serde_json::json!({});
    dispatch::sampling(&mut options, opts, "num_predict");
    if options.as_object().is_some_and(|o| !o.is_empty()) {
        if let Some(map) = body.as_object_mut() {
            map.insert("options".into(), options);
        }
    }
    DispatchRequest::json(url, BTreeMap::new(), &body)
}

pub fn parse(data: &str, _event: Option<&str>) -> Result<Vec<NormalizedOp>, ParseError> {
    let v: Value = serde_json::from_str(data)?;
    if !v.is_object() {
        return Err(ParseError::new("ollama line is not a json object"));
    }
    if let Some(err) = v.get("error").filter(|e| !e.is_null()) {
        let message = match err.as_str() {
            Some(s) => s.to_string(),
            None => err.to_string(),
        };
        return Ok(vec![NormalizedOp::issue("upstream_error", message), NormalizedOp::Close]);
    }

    let mut ops = Vec::new();
    match &v["message"]["content"] {
        Value::String(s) if !s.is_empty() => ops.push(NormalizedOp::text(s.as_str())),
        Value::String(_) | Value::Null => {}
        other => return Err(ParseError::new(format!("message content is not a string: {other}"))),
    }
    if v["done"].as_bool() == Some(true) {
        if let Some(reason) = v["done_reason"].as_str() {
            ops.push(NormalizedOp::field("finish_reason", Value::from(reason)));
        }
        let prompt = &v["prompt_eval_count"];
        let completion = &v["eval_count"];
        if !prompt.is_null() || !completion.is_null() {
            ops.push(NormalizedOp::field(
                "usage",
                serde_json::json!({"prompt_tokens": prompt, "completion_tokens": completion}),
            ));
        }
        ops.push(NormalizedOp::Close);
    }
    Ok(ops)
}
