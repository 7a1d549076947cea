//! Per-connection demultiplexers: decoded text chunks in, ordered wire events out.
//!
//! Both framings keep the trailing partial fragment of one call and prepend it
//! to the next, so the event sequence never depends on how the network
//! happened to split the body.

use crate::ops::WireEvent;
use tracing::trace;

pub trait Demultiplexer: Send {
    /// Feed one decoded chunk and return every event it completes, in order.
    fn demux(&mut self, chunk: &str) -> Vec<WireEvent>;

    /// Bytes of text held back waiting for a boundary.
    fn buffered(&self) -> usize;
}

/// `text/event-stream` framing.
#[derive(Debug, Default)]
pub struct SseDemux {
    buf: String,
    name: Option<String>,
    data: Vec<String>,
}

impl SseDemux {
    pub fn new() -> Self {
        Self::default()
    }

    fn feed_line(&mut self, line: &str, out: &mut Vec<WireEvent>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if let Some(comment) = line.strip_prefix(':') {
            out.push(WireEvent::other(None, comment.trim_start()));
            return;
        }
        let (field, value) = match line.find(':') {
            Some(i) => {
                let v = &line[i + 1..];
                (&line[..i], v.strip_prefix(' ').unwrap_or(v))
            }
            None => (line, ""),
        };
        match field {
            "event" => {
                self.name = (!value.is_empty()).then(|| value.to_string());
            }
            "data" => self.data.push(value.to_string()),
            "id" | "retry" => {}
            other => trace!(target: "core::demux", field = other, "ignoring unknown sse field"),
        }
    }

    fn dispatch(&mut self, out: &mut Vec<WireEvent>) {
        let name = self.name.take();
        if !self.data.is_empty() {
            out.push(WireEvent::event(name, self.data.join("\n")));
            self.data.clear();
        } else if name.is_some() {
            out.push(WireEvent::other(name, ""));
        }
    }
}

/// Returns `(line_len, consumed)` for the first complete line in `s`.
/// A `\r` at the very end is not yet a terminator: it may be half of `\r\n`.
fn next_line(s: &str) -> Option<(usize, usize)> {
    let pos = s.find(|c: char| c == '\r' || c == '\n')?;
    if s.as_bytes()[pos] == b'\n' {
        return Some((pos, pos + 1));
    }
    match s.as_bytes().get(pos + 1) {
        Some(b'\n') => Some((pos, pos + 2)),
        Some(_) => Some((pos, pos + 1)),
        None => None,
    }
}

impl Demultiplexer for SseDemux {
    fn demux(&mut self, chunk: &str) -> Vec<WireEvent> {
        let mut buf = std::mem::take(&mut self.buf);
        buf.push_str(chunk);

        let mut out = Vec::new();
        let mut start = 0;
        while let Some((len, consumed)) = next_line(&buf[start..]) {
            self.feed_line(&buf[start..start + len], &mut out);
            start += consumed;
        }
        buf.drain(..start);
        self.buf = buf;
        out
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Newline-delimited JSON framing: one event per non-blank line.
#[derive(Debug, Default)]
pub struct NdjsonDemux {
    buf: String,
}

impl NdjsonDemux {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Demultiplexer for NdjsonDemux {
    fn demux(&mut self, chunk: &str) -> Vec<WireEvent> {
        self.buf.push_str(chunk);
        let mut out = Vec::new();
        let mut start = 0;
        while let Some(pos) = self.buf[start..].find('\n') {
            let line = self.buf[start..start + pos].trim_end_matches('\r');
            if !line.trim().is_empty() {
                out.push(WireEvent::event(None, line));
            }
            start += pos + 1;
        }
        self.buf.drain(..start);
        out
    }

    fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::WireKind;
    use proptest::prelude::*;

    fn feed_all(d: &mut dyn Demultiplexer, chunks: &[&str]) -> Vec<WireEvent> {
        chunks.iter().flat_map(|c| d.demux(c)).collect()
    }

    #[test]
    fn single_event_with_name() {
        let mut d = SseDemux::new();
        let evs = d.demux("event: response.output_text.delta\ndata: {\"delta\":\"hi\"}\n\n");
        assert_eq!(
            evs,
            vec![WireEvent::event(
                Some("response.output_text.delta".into()),
                "{\"delta\":\"hi\"}"
            )]
        );
        assert_eq!(d.buffered(), 0);
    }

    #[test]
    fn multiple_data_lines_are_joined() {
        let mut d = SseDemux::new();
        let evs = d.demux("data: a\ndata:b\ndata:  c\n\n");
        assert_eq!(evs, vec![WireEvent::event(None, "a\nb\n c")]);
    }

    #[test]
    fn partial_fragment_waits_for_next_chunk() {
        let mut d = SseDemux::new();
        assert!(d.demux("data: {\"a\"").is_empty());
        assert!(d.buffered() > 0);
        assert!(d.demux(":1}\n").is_empty());
        assert_eq!(d.demux("\n"), vec![WireEvent::event(None, "{\"a\":1}")]);
    }

    #[test]
    fn two_events_in_one_chunk_keep_order_and_sentinel_passes_through() {
        let mut d = SseDemux::new();
        let evs = d.demux("data: one\n\ndata: [DONE]\n\ndata: late\n\n");
        let data: Vec<_> = evs.iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["one", "[DONE]", "late"]);
        assert!(evs.iter().all(WireEvent::is_event));
    }

    #[test]
    fn comments_are_framing_noise() {
        let mut d = SseDemux::new();
        let evs = d.demux(": ping\n\nevent: ping\n\n");
        assert_eq!(
            evs,
            vec![
                WireEvent::other(None, "ping"),
                WireEvent::other(Some("ping".into()), ""),
            ]
        );
        assert!(evs.iter().all(|e| e.kind == WireKind::Other));
    }

    #[test]
    fn crlf_split_between_chunks_is_one_terminator() {
        let mut d = SseDemux::new();
        let mut evs = d.demux("data: x\r");
        evs.extend(d.demux("\n\r"));
        evs.extend(d.demux("\ndata: y\r\r\n"));
        assert_eq!(
            evs,
            vec![WireEvent::event(None, "x"), WireEvent::event(None, "y")]
        );
    }

    #[test]
    fn id_and_retry_fields_are_ignored() {
        let mut d = SseDemux::new();
        let evs = d.demux("id: 7\nretry: 1000\ndata: v\n\n");
        assert_eq!(evs, vec![WireEvent::event(None, "v")]);
    }

    #[test]
    fn ndjson_lines_become_events() {
        let mut d = NdjsonDemux::new();
        let evs = feed_all(&mut d, &["{\"a\":1}\r\n\n  \n{\"b\"", ":2}\n{\"c\""]);
        assert_eq!(
            evs,
            vec![
                WireEvent::event(None, "{\"a\":1}"),
                WireEvent::event(None, "{\"b\":2}"),
            ]
        );
        assert_eq!(d.buffered(), "{\"c\"".len());
    }

    fn sse_body() -> impl Strategy<Value = String> {
        let line = prop_oneof![
            "[a-zé👋 {}\":]{0,12}".prop_map(|s| format!("data: {s}")),
            "[a-z._]{1,10}".prop_map(|s| format!("event: {s}")),
            Just(": keepalive".to_string()),
            Just(String::new()),
        ];
        let term = prop_oneof![Just("\n"), Just("\r\n"), Just("\r")];
        prop::collection::vec((line, term), 0..24)
            .prop_map(|v| v.into_iter().map(|(l, t)| l + t).collect())
    }

    fn char_splits(s: &str, cuts: &[prop::sample::Index]) -> Vec<String> {
        let mut points: Vec<usize> = cuts
            .iter()
            .map(|i| {
                let mut p = i.index(s.len() + 1);
                while !s.is_char_boundary(p) {
                    p -= 1;
                }
                p
            })
            .collect();
        points.sort_unstable();
        let mut pieces = Vec::new();
        let mut last = 0;
        for p in points {
            pieces.push(s[last..p].to_string());
            last = p;
        }
        pieces.push(s[last..].to_string());
        pieces
    }

    proptest! {
        #[test]
        fn sse_is_invariant_under_chunk_splits(
            body in sse_body(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let whole = SseDemux::new().demux(&body);
            let pieces = char_splits(&body, &cuts);
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            let split = feed_all(&mut SseDemux::new(), &refs);
            prop_assert_eq!(whole, split);
        }

        #[test]
        fn ndjson_is_invariant_under_chunk_splits(
            lines in prop::collection::vec("[a-z0-9{}\": é]{0,16}", 0..16),
            crlf in any::<bool>(),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..6),
        ) {
            let sep = if crlf { "\r\n" } else { "\n" };
            let body: String = lines.iter().map(|l| format!("{l}{sep}")).collect();
            let whole = NdjsonDemux::new().demux(&body);
            let pieces = char_splits(&body, &cuts);
            let refs: Vec<&str> = pieces.iter().map(String::as_str).collect();
            let split = feed_all(&mut NdjsonDemux::new(), &refs);
            prop_assert_eq!(whole, split);
        }
    }
}
