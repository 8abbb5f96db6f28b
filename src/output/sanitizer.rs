//! Output sanitization for stripping ANSI escape codes.

use vte::{Parser, Perform};

/// One-shot sanitizer for complete buffers.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Strip ANSI escape codes and carriage returns from raw bytes.
    ///
    /// Returns clean UTF-8 text with all control sequences removed.
    pub fn strip_ansi(input: &[u8]) -> String {
        let mut stream = StreamSanitizer::new();
        stream.feed(input);
        stream.into_string()
    }

    /// Strip ANSI codes from a string.
    pub fn strip_ansi_str(input: &str) -> String {
        Self::strip_ansi(input.as_bytes())
    }
}

/// Incremental sanitizer that keeps parser state between chunks.
///
/// Transport reads split escape sequences and multi-byte characters at
/// arbitrary points; feeding every chunk through one parser keeps them intact.
pub struct StreamSanitizer {
    parser: Parser,
    extractor: PlainTextExtractor,
}

impl StreamSanitizer {
    /// Create an empty sanitizer.
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            extractor: PlainTextExtractor::default(),
        }
    }

    /// Feed another chunk of raw bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.extractor, bytes);
    }

    /// Clean text accumulated so far.
    pub fn text(&self) -> &str {
        &self.extractor.output
    }

    /// Whether no printable text has been produced yet.
    pub fn is_empty(&self) -> bool {
        self.extractor.output.is_empty()
    }

    /// Drop the first `len` bytes of accumulated text.
    ///
    /// `len` must fall on a character boundary of [`text`](Self::text).
    pub fn discard_prefix(&mut self, len: usize) {
        self.extractor.output.drain(..len);
    }

    /// Consume the sanitizer and return the accumulated text.
    pub fn into_string(self) -> String {
        self.extractor.output
    }
}

impl Default for StreamSanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// VTE performer that extracts plain text.
#[derive(Default)]
struct PlainTextExtractor {
    output: String,
}

impl Perform for PlainTextExtractor {
    fn print(&mut self, c: char) {
        self.output.push(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            // Newline and tab survive; `\r` is dropped so `\r\n` folds to `\n`.
            0x0A | 0x09 => self.output.push(byte as char),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_color_codes() {
        let input = b"\x1b[31mred\x1b[0m";
        let output = OutputSanitizer::strip_ansi(input);
        assert_eq!(output, "red");
    }

    #[test]
    fn test_crlf_folds_to_lf() {
        let input = b"line1\r\nline2\r\n";
        let output = OutputSanitizer::strip_ansi(input);
        assert_eq!(output, "line1\nline2\n");
    }

    #[test]
    fn test_strip_cursor_movement() {
        let input = b"\x1b[2J\x1b[Hcontent";
        let output = OutputSanitizer::strip_ansi(input);
        assert_eq!(output, "content");
    }

    #[test]
    fn test_bracketed_paste_toggle_removed() {
        // bash with readline emits these around every prompt
        let input = b"\x1b[?2004h/home/alice\r\n\x1b[?2004l";
        let output = OutputSanitizer::strip_ansi(input);
        assert_eq!(output, "/home/alice\n");
    }

    #[test]
    fn test_osc_title() {
        let input = b"\x1b]0;alice@host: ~\x07actual content";
        let output = OutputSanitizer::strip_ansi(input);
        assert_eq!(output, "actual content");
    }

    #[test]
    fn test_strip_ansi_str() {
        let output = OutputSanitizer::strip_ansi_str("\x1b[31mcolored\x1b[0m");
        assert_eq!(output, "colored");
    }

    #[test]
    fn test_preserve_tabs() {
        let output = OutputSanitizer::strip_ansi(b"col1\tcol2");
        assert_eq!(output, "col1\tcol2");
    }

    #[test]
    fn test_stream_split_escape_sequence() {
        let mut stream = StreamSanitizer::new();
        stream.feed(b"before\x1b[");
        stream.feed(b"1;32mafter");
        assert_eq!(stream.text(), "beforeafter");
    }

    #[test]
    fn test_stream_split_utf8() {
        let bytes = "héllo".as_bytes();
        let mut stream = StreamSanitizer::new();
        stream.feed(&bytes[..2]);
        stream.feed(&bytes[2..]);
        assert_eq!(stream.text(), "héllo");
    }

    #[test]
    fn test_discard_prefix() {
        let mut stream = StreamSanitizer::new();
        stream.feed(b"stale\nfresh");
        stream.discard_prefix("stale\n".len());
        assert_eq!(stream.text(), "fresh");
        assert!(!stream.is_empty());
    }

    #[test]
    fn test_only_escape_codes() {
        let output = OutputSanitizer::strip_ansi(b"\x1b[31m\x1b[0m\x1b[2J");
        assert_eq!(output, "");
    }
}
