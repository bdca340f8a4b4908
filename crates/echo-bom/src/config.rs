// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Writer and reader configuration.
//!
//! Configs are plain serde structs so tools can keep them in JSON blobs next
//! to their other settings. Missing fields fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::wire::WireLimits;

/// Writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Emit REF records for ids already written this session.
    pub dedup: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self { dedup: true }
    }
}

/// Reader limits. Anything past a limit is reported as a malformed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Maximum record nesting depth.
    pub max_depth: usize,
    /// Maximum byte length of a type or property name.
    pub max_string_len: usize,
    /// Maximum byte length of a value payload.
    pub max_payload_len: usize,
    /// Maximum number of properties, elements or children in one record.
    pub max_entries: usize,
    /// Maximum length of a type's extends chain.
    pub max_type_depth: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            max_depth: 128,
            max_string_len: 64 * 1024,
            max_payload_len: 256 * 1024 * 1024,
            max_entries: 1 << 20,
            max_type_depth: 32,
        }
    }
}

impl ReaderConfig {
    pub(crate) fn limits(&self) -> WireLimits {
        WireLimits {
            max_string_len: self.max_string_len,
            max_payload_len: self.max_payload_len,
            max_entries: self.max_entries,
            max_type_depth: self.max_type_depth,
        }
    }
}

/// Combined settings, as stored by tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BomConfig {
    /// Writer settings.
    pub writer: WriterConfig,
    /// Reader settings.
    pub reader: ReaderConfig,
}

impl BomConfig {
    /// Parses a JSON config blob.
    ///
    /// # Errors
    /// Returns the `serde_json` error for malformed input.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Renders the config as pretty JSON.
    ///
    /// # Errors
    /// Returns the `serde_json` error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
