use anyhow::Result;
use serde::Serialize;
use std::io::Write;

/// One JSON document per line, flushed as soon as it is written.
pub struct JsonLines<W: Write> {
    out: W,
}

impl<W: Write> JsonLines<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn write<T: Serialize>(&mut self, item: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, item)?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}
