//! Completion sentinels.
//!
//! Every command sent to the remote shell is followed by
//! `echo __COMMAND_COMPLETED_<ms>__ $?`. The shell expands `$?` to the exit
//! status of the command, so a completion line is the token followed by a
//! number. A terminal echoing our input back shows the token followed by a
//! literal `$?`, which never matches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Prefix shared by all sentinel tokens.
pub const SENTINEL_PREFIX: &str = "__COMMAND_COMPLETED_";

/// Last stamp handed out; keeps tokens unique within the process.
static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// Position of a completion line inside accumulated output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentinelMatch {
    /// Byte offset where the token starts; everything before it is output.
    pub start: usize,
    /// Byte offset just past the terminating newline.
    pub end: usize,
    /// Exit status reported by the shell.
    pub exit_code: i32,
}

/// A unique completion marker for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    token: String,
}

impl Sentinel {
    /// Create a sentinel stamped with the current wall-clock millisecond.
    ///
    /// Two sentinels created in the same millisecond still differ: the stamp
    /// is bumped past the previous one.
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        let mut previous = LAST_STAMP.load(Ordering::Relaxed);
        loop {
            let stamp = now.max(previous + 1);
            match LAST_STAMP.compare_exchange_weak(
                previous,
                stamp,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self::from_stamp(stamp),
                Err(actual) => previous = actual,
            }
        }
    }

    /// Sentinel for a fixed stamp.
    pub fn from_stamp(stamp: u64) -> Self {
        Self {
            token: format!("{}{}__", SENTINEL_PREFIX, stamp),
        }
    }

    /// The bare token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Shell line that prints the completion marker.
    pub fn echo_command(&self) -> String {
        format!("echo {} $?", self.token)
    }

    /// Find the completion line in `text`.
    ///
    /// Only newline-terminated lines count, so a partially received exit
    /// code is never misread. Output that did not end in a newline puts the
    /// token mid-line; the text before it is still output.
    pub fn find_completion(&self, text: &str) -> Option<SentinelMatch> {
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();

            if !line.ends_with('\n') {
                break;
            }

            let mut search_from = 0;
            while let Some(found) = line[search_from..].find(&self.token) {
                let token_at = search_from + found;
                let rest = line[token_at + self.token.len()..].trim();
                if let Ok(exit_code) = rest.parse::<i32>() {
                    return Some(SentinelMatch {
                        start: line_start + token_at,
                        end: offset,
                        exit_code,
                    });
                }
                search_from = token_at + self.token.len();
            }
        }
        None
    }
}

impl Default for Sentinel {
    fn default() -> Self {
        Self::new()
    }
}

/// Remove lines carrying any sentinel token at all.
pub fn strip_all_sentinels(text: &str) -> String {
    text.split_inclusive('\n')
        .filter(|line| !line.contains(SENTINEL_PREFIX))
        .collect()
}
