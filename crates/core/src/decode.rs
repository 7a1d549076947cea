//! Incremental, lossy UTF-8 decoding of upstream byte chunks.

const REPLACEMENT: char = '\u{FFFD}';

/// Turns byte chunks into text, carrying an incomplete trailing sequence
/// over to the next call. Never fails.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`; with `final_chunk` set, an unfinished sequence left at
    /// the end becomes a replacement character instead of being retained.
    pub fn decode(&mut self, bytes: &[u8], final_chunk: bool) -> String {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut out = String::with_capacity(buf.len());
        let mut rest: &[u8] = &buf;
        loop {
            match std::str::from_utf8(rest) {
                Ok(s) => {
                    out.push_str(s);
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    if let Ok(s) = std::str::from_utf8(&rest[..valid]) {
                        out.push_str(s);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            out.push(REPLACEMENT);
                            rest = &rest[valid + bad..];
                        }
                        None => {
                            let tail = &rest[valid..];
                            if final_chunk {
                                out.push(REPLACEMENT);
                            } else {
                                self.pending.extend_from_slice(tail);
                            }
                            break;
                        }
                    }
                }
            }
        }
        out
    }

    /// Number of bytes held back waiting for the rest of a character.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
