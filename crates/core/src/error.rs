use crate::ops::Reason;
use thiserror::Error;

/// A vendor payload that does not match its dialect's grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        ParseError(msg.into())
    }
}

impl From<serde_json::Error> for ParseError {
    fn from(e: serde_json::Error) -> Self {
        ParseError(format!("malformed json: {e}"))
    }
}

#[derive(Error, Debug)]
pub enum IntakeError {
    /// Bad credentials, model or history; no network call was made.
    #[error("{0}")]
    Prepare(String),
    /// Request issuance, connect, timeout or a non-success upstream status.
    #[error("{message}")]
    Connect {
        message: String,
        status: Option<u16>,
        detail: Option<String>,
    },
    /// Abnormal failure while reading an established stream.
    #[error("{0}")]
    Read(String),
    /// The client asked to stop.
    #[error("canceled")]
    Canceled,
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Data observed after termination. Diagnostic only.
    #[error("protocol anomaly: {0}")]
    Anomaly(String),
}

impl IntakeError {
    pub fn prepare<S: Into<String>>(msg: S) -> Self {
        IntakeError::Prepare(msg.into())
    }

    pub fn connect<S: Into<String>>(msg: S) -> Self {
        IntakeError::Connect { message: msg.into(), status: None, detail: None }
    }

    /// Reason code for the terminal item this error produces, if any.
    pub fn reason(&self) -> Option<Reason> {
        match self {
            IntakeError::Prepare(_) => Some(Reason::DispatchPrepare),
            IntakeError::Connect { .. } => Some(Reason::DispatchFetch),
            IntakeError::Read(_) => Some(Reason::DispatchRead),
            IntakeError::Parse(_) => Some(Reason::DispatchParse),
            IntakeError::Canceled | IntakeError::Anomaly(_) => None,
        }
    }

    /// Upstream status and body excerpt, when the transport captured them.
    pub fn upstream_detail(&self) -> Option<String> {
        match self {
            IntakeError::Connect { status, detail, .. } => match (status, detail) {
                (Some(s), Some(d)) if !d.is_empty() => Some(format!("status {s}: {d}")),
                (Some(s), _) => Some(format!("status {s}")),
                (None, Some(d)) if !d.is_empty() => Some(d.clone()),
                _ => None,
            },
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_stage_maps_to_its_reason() {
        assert_eq!(IntakeError::prepare("x").reason(), Some(Reason::DispatchPrepare));
        assert_eq!(IntakeError::connect("x").reason(), Some(Reason::DispatchFetch));
        assert_eq!(IntakeError::Read("x".into()).reason(), Some(Reason::DispatchRead));
        assert_eq!(
            IntakeError::from(ParseError::new("x")).reason(),
            Some(Reason::DispatchParse)
        );
        assert_eq!(IntakeError::Canceled.reason(), None);
        assert_eq!(IntakeError::Anomaly("late".into()).reason(), None);
    }

    #[test]
    fn upstream_detail_combines_status_and_body() {
        let e = IntakeError::Connect {
            message: "authentication rejected".into(),
            status: Some(401),
            detail: Some("invalid key".into()),
        };
        assert_eq!(e.upstream_detail().as_deref(), Some("status 401: invalid key"));
        assert_eq!(e.to_string(), "authentication rejected");
        assert_eq!(IntakeError::connect("refused").upstream_detail(), None);
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let parse = ParseError::from(err);
        assert!(parse.0.starts_with("malformed json"));
    }
}
