//! Output processing for raw transport bytes.
//!
//! A remote shell started with `-tt` talks to a pseudo-terminal, so its
//! output carries colour codes, title sequences and `\r\n` line endings.
//! Everything handed to callers goes through [`OutputSanitizer`] first.
//!
//! # Example
//!
//! ```
//! use remote_shell::output::{OutputSanitizer, StreamSanitizer};
//!
//! let clean = OutputSanitizer::strip_ansi(b"\x1b[31mRed text\x1b[0m\r\n");
//! assert_eq!(clean, "Red text\n");
//!
//! // Escape sequences may be split across reads.
//! let mut stream = StreamSanitizer::new();
//! stream.feed(b"\x1b[3");
//! stream.feed(b"2mgreen");
//! assert_eq!(stream.text(), "green");
//! ```

mod sanitizer;

pub use sanitizer::{OutputSanitizer, StreamSanitizer};
