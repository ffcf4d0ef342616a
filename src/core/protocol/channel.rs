// src/core/protocol/channel.rs

//! Channel names, their classification, and pattern expansion.

use std::fmt;
use strum_macros::{Display, EnumString};

/// The prefix that marks a protocol control channel.
pub const META_PREFIX: &str = "/meta/";
/// The prefix reserved for direct request/response channels. Service
/// channels are answered by application code and never enter the
/// subscription register.
pub const SERVICE_PREFIX: &str = "/service";

/// The sub-type of a `/meta/` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum MetaType {
    Handshake,
    Connect,
    Subscribe,
    Unsubscribe,
    Disconnect,
    Unknown,
}

/// An immutable channel name. Patterns and concrete channels share the same
/// syntactic domain; only pattern evaluation distinguishes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    name: String,
}

impl Channel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True if this is a `/meta/` control channel.
    pub fn is_meta(&self) -> bool {
        self.name.starts_with(META_PREFIX)
    }

    /// True if this is a `/service` channel.
    pub fn is_service(&self) -> bool {
        self.name.starts_with(SERVICE_PREFIX)
    }

    /// Returns the meta sub-type, or `None` for non-meta channels.
    /// Unrecognised sub-tags map to `MetaType::Unknown`.
    pub fn meta_type(&self) -> Option<MetaType> {
        if !self.is_meta() {
            return None;
        }
        Some(
            self.name[META_PREFIX.len()..]
                .parse()
                .unwrap_or(MetaType::Unknown),
        )
    }

    /// Returns the ordered list of patterns that could subscribe-match this
    /// channel.
    ///
    /// For `/foo/bar` the result is:
    ///
    /// ```text
    /// /**
    /// /foo/**
    /// /foo/*
    /// /foo/bar
    /// ```
    ///
    /// The register is keyed by exact pattern string, so a publish lookup is
    /// a handful of hash probes over this list rather than a tree walk. The
    /// `/**` entries are generated at odd segment positions only; the
    /// single-segment wildcard is meaningful one level above the leaf.
    /// Repeated slashes are not normalised: a trailing empty segment is a
    /// segment like any other.
    pub fn expand(&self) -> Vec<String> {
        let segments: Vec<&str> = self.name.split('/').collect();
        let num_segments = segments.len();

        let mut patterns = Vec::with_capacity(num_segments + 1);
        patterns.push("/**".to_string());
        let mut i = 1;
        while i + 1 < num_segments {
            patterns.push(format!("{}/**", segments[..=i].join("/")));
            i += 2;
        }
        patterns.push(format!("{}/*", segments[..num_segments - 1].join("/")));
        patterns.push(self.name.clone());
        patterns
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
