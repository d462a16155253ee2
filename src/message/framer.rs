//! Line framing for subprocess output streams
//!
//! Pipes deliver output in arbitrary chunks: a chunk may hold several lines,
//! part of one, or nothing at all. [`LineFramer`] buffers the undelimited tail
//! and yields only complete lines. Framing is done on bytes so a multi-byte
//! UTF-8 sequence split across two reads is reassembled before decoding.

/// Accumulates raw chunks and yields complete `\n`-terminated lines
///
/// Emitted lines never contain `\n`. The terminator is removed; any `\r`
/// before it is left in place.
///
/// With a maximum line length, a line longer than the limit is emitted in
/// pieces of at most that many bytes (cut on a UTF-8 boundary where one
/// exists), so the buffer never holds more than the limit plus one chunk.
/// Concatenating the pieces still reproduces the input.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
    head: usize,
    max_line_length: Option<usize>,
    splits: usize,
}

impl LineFramer {
    /// Create an empty framer with no line length limit
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            head: 0,
            max_line_length: None,
            splits: 0,
        }
    }

    /// Create an empty framer that splits lines longer than `max` bytes
    ///
    /// A limit of zero is treated as one byte.
    #[must_use]
    pub const fn with_max_line_length(max: usize) -> Self {
        let max = if max == 0 { 1 } else { max };
        Self {
            buffer: Vec::new(),
            head: 0,
            max_line_length: Some(max),
            splits: 0,
        }
    }

    /// Configured line length limit, if any
    #[must_use]
    pub const fn max_line_length(&self) -> Option<usize> {
        self.max_line_length
    }

    /// Number of forced splits since the last call, resetting the count
    pub fn take_splits(&mut self) -> usize {
        std::mem::take(&mut self.splits)
    }

    /// Append a chunk and iterate over the lines it completes
    ///
    /// The iterator is lazy. Lines it does not get to yield (because it was
    /// dropped early) stay buffered and come out of the next `feed`.
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> FramedLines<'_> {
        self.compact();
        self.buffer.extend_from_slice(chunk.as_ref());
        FramedLines { framer: self }
    }

    /// Emit the retained fragment as a final line, even though it is unterminated
    ///
    /// Returns `None` if nothing is buffered.
    pub fn flush(&mut self) -> Option<String> {
        self.compact();
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Number of buffered bytes not yet emitted
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len() - self.head
    }

    /// Drop any buffered partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.head = 0;
    }

    fn compact(&mut self) {
        if self.head > 0 {
            self.buffer.drain(..self.head);
            self.head = 0;
        }
    }
}

/// Iterator over the complete lines available after a [`LineFramer::feed`]
#[derive(Debug)]
pub struct FramedLines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for FramedLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let framer = &mut *self.framer;
        let head = framer.head;
        let pending = &framer.buffer[head..];
        let newline = pending.iter().position(|byte| *byte == b'\n');

        let (len, consumed) = match (newline, framer.max_line_length) {
            (Some(offset), Some(max)) if offset > max => {
                let cut = split_point(pending, max);
                (cut, cut)
            }
            (Some(offset), _) => (offset, offset + 1),
            (None, Some(max)) if pending.len() > max => {
                let cut = split_point(pending, max);
                (cut, cut)
            }
            (None, _) => return None,
        };
        if len == consumed {
            framer.splits += 1;
        }

        let line = String::from_utf8_lossy(&pending[..len]).into_owned();
        framer.head = head + consumed;
        Some(line)
    }
}

/// Largest cut at or below `max` that does not split a UTF-8 sequence
///
/// `bytes` is longer than `max`. Falls back to `max` when no boundary exists.
fn split_point(bytes: &[u8], max: usize) -> usize {
    let is_continuation = |byte: u8| byte & 0xC0 == 0x80;
    (1..=max)
        .rev()
        .find(|&cut| !is_continuation(bytes[cut]))
        .unwrap_or(max)
}

impl Drop for FramedLines<'_> {
    fn drop(&mut self) {
        self.framer.compact();
    }
}
