//! Per-line decoding of captured output
//!
//! Child processes write bytes; the log sink takes text. A [`LineFilter`] is
//! chosen once at startup for the host platform and applied to every captured
//! line:
//!
//! - Linux and macOS consoles emit UTF-8; [`Utf8Filter`] decodes lossily and
//!   never rejects a line.
//! - Windows consoles on Chinese locales emit GB18030; [`Gb18030Filter`] decodes
//!   strictly and rejects malformed lines so they can be dropped instead of
//!   corrupting the log.

use crate::{CoreError, Result};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Converts one captured line of raw bytes into text
pub trait LineFilter: Send + Sync {
    /// Decode a single line (without its trailing newline)
    fn decode(&self, raw: &[u8]) -> Result<String>;

    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Length of the longest prefix of `raw` that does not end inside a
    /// multi-byte character
    ///
    /// Used when a line has to be cut, so the cut lands between characters.
    fn complete_prefix(&self, raw: &[u8]) -> usize {
        raw.len()
    }
}

/// Lossy UTF-8 decoding; invalid sequences become U+FFFD
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Filter;

impl LineFilter for Utf8Filter {
    fn decode(&self, raw: &[u8]) -> Result<String> {
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    fn name(&self) -> &'static str {
        "UTF-8"
    }

    fn complete_prefix(&self, raw: &[u8]) -> usize {
        // A UTF-8 character is at most 4 bytes, so only the tail matters
        for start in (raw.len().saturating_sub(3)..raw.len()).rev() {
            let width = match raw[start] {
                0x80..=0xBF => continue,
                0xC0..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF7 => 4,
                _ => return raw.len(),
            };
            return if start + width > raw.len() { start } else { raw.len() };
        }
        raw.len()
    }
}

/// Strict GB18030 decoding
#[derive(Debug, Default, Clone, Copy)]
pub struct Gb18030Filter;

impl LineFilter for Gb18030Filter {
    fn decode(&self, raw: &[u8]) -> Result<String> {
        encoding_rs::GB18030
            .decode_without_bom_handling_and_without_replacement(raw)
            .map(|text| text.into_owned())
            .ok_or(CoreError::Decode {
                encoding: self.name(),
                len: raw.len(),
            })
    }

    fn name(&self) -> &'static str {
        "GB18030"
    }

    fn complete_prefix(&self, raw: &[u8]) -> usize {
        // Trail bytes overlap the ASCII and lead ranges, so walk from the start
        let mut i = 0;
        while i < raw.len() {
            let width = match raw[i] {
                0x81..=0xFE => match raw.get(i + 1) {
                    None => return i,
                    Some(0x30..=0x39) => 4,
                    Some(_) => 2,
                },
                _ => 1,
            };
            if i + width > raw.len() {
                return i;
            }
            i += width;
        }
        raw.len()
    }
}

/// Encoding selection as given on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Pick by host platform
    #[default]
    Auto,
    Utf8,
    Gb18030,
}

impl Encoding {
    /// Resolve [`Encoding::Auto`] to the concrete encoding for this platform
    pub fn resolve(self) -> Encoding {
        match self {
            Encoding::Auto if cfg!(windows) => Encoding::Gb18030,
            Encoding::Auto => Encoding::Utf8,
            other => other,
        }
    }
}

impl FromStr for Encoding {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Encoding::Auto),
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "gb18030" | "gbk" => Ok(Encoding::Gb18030),
            other => Err(CoreError::ConfigurationError(format!(
                "Unknown encoding '{other}' (expected auto, utf8 or gb18030)"
            ))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Encoding::Auto => "auto",
            Encoding::Utf8 => "utf8",
            Encoding::Gb18030 => "gb18030",
        };
        f.write_str(s)
    }
}

/// Build the filter for `encoding`, resolving `Auto` by host platform
pub fn filter_for(encoding: Encoding) -> Arc<dyn LineFilter> {
    match encoding.resolve() {
        Encoding::Gb18030 => Arc::new(Gb18030Filter),
        _ => Arc::new(Utf8Filter),
    }
}
