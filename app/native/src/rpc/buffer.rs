//! Line framing for the socket reader.

/// Upper bound for a single unterminated line. Anything larger is discarded.
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

/// Accumulates raw bytes and yields complete newline-terminated lines.
///
/// A trailing partial line stays buffered until the rest arrives.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Appends `bytes` and returns every line completed by them, without the
    /// terminator. Blank lines are skipped.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            let raw = &self.buf[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            if !raw.iter().all(u8::is_ascii_whitespace) {
                lines.push(String::from_utf8_lossy(raw).into_owned());
            }
            start = end + 1;
        }
        self.buf.drain(..start);

        if self.buf.len() > MAX_LINE_BYTES {
            tracing::warn!(bytes = self.buf.len(), "discarding oversized partial line");
            self.buf.clear();
        }

        lines
    }

    /// Bytes of the partial line currently held.
    #[must_use]
    pub fn pending(&self) -> usize { self.buf.len() }
}
