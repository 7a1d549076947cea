//! The intake pump: one call in, one ordered `ClientItem` stream out.
//!
//! Lifecycle is `NotStarted -> Streaming -> Terminated`. The returned stream is
//! pull-based; nothing is read from upstream until the consumer asks for the
//! next item. Exactly one `End` item is produced per call unless the client
//! cancels, in which case the stream simply stops.

use crate::{
    config::AccessConfig,
    dispatch::{self, DispatchHandle, EventParser},
    transport::{Transport, UpstreamBody},
};
use bytes::Bytes;
use futures::Stream;
use intake_core::{
    decode::Utf8Decoder,
    error::IntakeError,
    llm::{ChatOpts, Message},
    ops::{ClientItem, ClientOp, NormalizedOp, Reason, WireEvent},
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Clone, Debug, Default)]
pub struct PumpOptions {
    /// Append the outbound url to connectivity and read issues.
    /// Message payload only; control flow is identical either way.
    pub dev_diagnostics: bool,
    /// A read producing nothing for this long is a streaming issue.
    pub idle_timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct IntakeRequest {
    pub access: AccessConfig,
    pub opts: ChatOpts,
    pub history: Vec<Message>,
}

pub struct IntakePump<T> {
    transport: T,
    options: PumpOptions,
}

impl<T: Transport> IntakePump<T> {
    pub fn new(transport: T, options: PumpOptions) -> Self {
        Self { transport, options }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn run(
        &self,
        request: IntakeRequest,
        cancel: CancellationToken,
    ) -> impl Stream<Item = ClientItem> + '_ {
        let transport = &self.transport;
        let options = self.options.clone();
        async_stream::stream! {
            let mut session = IntakeSession::default();
            yield ClientItem::Start;
            info!(
                target: "providers::pump",
                dialect = %request.access.dialect,
                model = %request.opts.model,
                turns = request.history.len(),
                "intake start"
            );

            let handle = match dispatch::build(&request.access, &request.opts, &request.history) {
                Ok(h) => h,
                Err(e) => {
                    let msg = format!("service creation failed: {e}");
                    if let Some(end) = session.end(Reason::DispatchPrepare, msg) {
                        yield end;
                    }
                    return;
                }
            };
            let DispatchHandle { request: outbound, mut demux, parse, sentinel, .. } = handle;

            let opened = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(IntakeError::Canceled),
                r = transport.open(&outbound, &cancel) => r,
            };
            let mut body = match opened {
                Ok(b) => b,
                Err(IntakeError::Canceled) => {
                    session.cancel();
                    return;
                }
                Err(e) => {
                    let msg = describe(
                        "service connectivity issue",
                        &e,
                        &outbound.url,
                        options.dev_diagnostics,
                    );
                    if let Some(end) = session.end(Reason::DispatchFetch, msg) {
                        yield end;
                    }
                    return;
                }
            };

            let mut decoder = Utf8Decoder::new();
            while !session.is_terminated() {
                let read = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Some(Err(IntakeError::Canceled)),
                    r = read_chunk(&mut body, options.idle_timeout) => r,
                };
                let bytes = match read {
                    Some(Ok(b)) => b,
                    None => {
                        // an incomplete sequence left in the decoder becomes U+FFFD
                        let tail = decoder.decode(&[], true);
                        let events = demux.demux(&tail);
                        for item in session.absorb(events, parse, sentinel) {
                            yield item;
                        }
                        let held = demux.buffered();
                        if held > 0 {
                            debug!(
                                target: "providers::pump",
                                held,
                                "discarding unterminated trailing fragment"
                            );
                        }
                        let msg = "upstream closed the stream".to_string();
                        if let Some(end) = session.end(Reason::DispatchClose, msg) {
                            yield end;
                        }
                        break;
                    }
                    Some(Err(IntakeError::Canceled)) => {
                        session.cancel();
                        break;
                    }
                    Some(Err(_)) if cancel.is_cancelled() => {
                        session.cancel();
                        break;
                    }
                    Some(Err(e)) => {
                        let msg =
                            describe("streaming issue", &e, &outbound.url, options.dev_diagnostics);
                        if let Some(end) = session.end(Reason::DispatchRead, msg) {
                            yield end;
                        }
                        break;
                    }
                };

                let text = decoder.decode(&bytes, false);
                let events = demux.demux(&text);
                for item in session.absorb(events, parse, sentinel) {
                    yield item;
                }
            }
            drop(body);
        }
    }
}

async fn read_chunk(
    body: &mut UpstreamBody,
    idle: Option<Duration>,
) -> Option<Result<Bytes, IntakeError>> {
    match idle {
        None => body.next_chunk().await,
        Some(limit) => match tokio::time::timeout(limit, body.next_chunk()).await {
            Ok(next) => next,
            Err(_) => Some(Err(IntakeError::Read(format!(
                "no data received for {} ms",
                limit.as_millis()
            )))),
        },
    }
}

fn describe(stage: &str, e: &IntakeError, url: &str, dev: bool) -> String {
    let mut msg = format!("{stage}: {e}");
    if let Some(detail) = e.upstream_detail() {
        msg.push_str(&format!(" ({detail})"));
    }
    if dev {
        msg.push_str(&format!(" [url: {url}]"));
    }
    msg
}

fn anomaly(detail: String) {
    let e = IntakeError::Anomaly(detail);
    warn!(target: "providers::pump", "{e}");
}

/// Per-call termination state. Once terminated, never reset.
#[derive(Debug, Default)]
pub(crate) struct IntakeSession {
    terminated: bool,
}

impl IntakeSession {
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The terminal item, or `None` (logged) if the call already ended.
    pub(crate) fn end(&mut self, reason: Reason, message: String) -> Option<ClientItem> {
        if self.terminated {
            anomaly(format!("second terminal signal '{reason}' suppressed"));
            return None;
        }
        self.terminated = true;
        if reason.is_error() {
            warn!(target: "providers::pump", %reason, %message, "intake failed");
        } else {
            info!(target: "providers::pump", %reason, "intake end");
        }
        Some(ClientItem::end(reason, message))
    }

    /// Client-initiated stop: terminate without emitting anything.
    pub(crate) fn cancel(&mut self) {
        if !self.terminated {
            self.terminated = true;
            debug!(target: "providers::pump", "client canceled; releasing upstream");
        }
    }

    /// Run one demultiplexed batch through sentinel detection and the parser.
    pub(crate) fn absorb(
        &mut self,
        events: Vec<WireEvent>,
        parse: EventParser,
        sentinel: Option<&str>,
    ) -> Vec<ClientItem> {
        let total = events.len();
        let mut out = Vec::new();
        for (i, ev) in events.into_iter().enumerate() {
            if self.terminated {
                anomaly(format!("dropped {} event(s) received after termination", total - i));
                break;
            }
            if !ev.is_event() {
                trace!(
                    target: "providers::pump",
                    name = ?ev.name,
                    data = %ev.data,
                    "framing noise"
                );
                continue;
            }
            if sentinel.is_some_and(|s| ev.data.trim() == s) {
                out.extend(self.end(Reason::EventDone, "stream complete".to_string()));
                continue;
            }
            let ops = match parse(&ev.data, ev.name.as_deref()) {
                Ok(ops) => ops,
                Err(e) => {
                    debug!(
                        target: "providers::pump",
                        event = ?ev.name,
                        data = %ev.data,
                        "unparseable event"
                    );
                    out.extend(self.end(Reason::DispatchParse, format!("parsing issue: {e}")));
                    continue;
                }
            };
            let count = ops.len();
            for (j, op) in ops.into_iter().enumerate() {
                if self.terminated {
                    anomaly(format!("dropped {} operation(s) after parser close", count - j));
                    break;
                }
                match op {
                    NormalizedOp::Close => {
                        let msg = "parser signalled completion".to_string();
                        out.extend(self.end(Reason::ParserDone, msg));
                    }
                    NormalizedOp::TextDelta(t) => out.push(ClientItem::op(ClientOp::Text(t))),
                    NormalizedOp::SetField(v) => out.push(ClientItem::op(ClientOp::Set(v))),
                    NormalizedOp::Issue { code, message } => {
                        out.push(ClientItem::op(ClientOp::Issue { code, message }));
                    }
                }
            }
        }
        out
    }
}
