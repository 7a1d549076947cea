pub mod chat;
pub mod responses;

use std::collections::BTreeMap;

fn headers(api_key: &str) -> BTreeMap<String, String> {
    let mut h = BTreeMap::new();
    h.insert("authorization".to_string(), format!("Bearer {api_key}"));
    h.insert("accept".to_string(), "text/event-stream".to_string());
    h
}

/// Map Codex-style presets to base model + verbosity for the Responses API.
fn normalize_gpt5(model: &str) -> (&str, Option<&'static str>) {
    match model {
        "gpt-5-high" => ("gpt-5", Some("high")),
        "gpt-5-medium" => ("gpt-5", Some("medium")),
        "gpt-5-low" => ("gpt-5", Some("low")),
        "gpt-5-minimal" => ("gpt-5", Some("minimal")),
        m => (m, None),
    }
}

/// `error` object of an OpenAI payload as `(code, message)`.
fn error_parts(err: &serde_json::Value) -> (String, String) {
    let code = err["code"]
        .as_str()
        .or_else(|| err["type"].as_str())
        .unwrap_or("upstream_error")
        .to_string();
    let message = err["message"]
        .as_str()
        .unwrap_or("upstream reported an error")
        .to_string();
    (code, message)
}
