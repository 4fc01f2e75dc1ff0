//! String newtypes for digests, image tags and container handles.
//!
//! Each serializes as a plain string.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_newtype!(
    /// Hex-encoded sha256 digest as recorded in a descriptor file.
    Digest
);

string_newtype!(
    /// Deterministic image reference produced for one module in one run.
    ImageTag
);

string_newtype!(
    /// Opaque runtime handle for a started container process.
    ContainerHandle
);

impl Digest {
    /// Compare against a computed lowercase hex digest.
    ///
    /// Case-insensitive; a leading `sha256:` on the recorded value is ignored.
    pub fn matches(&self, actual_hex: &str) -> bool {
        let recorded = self.0.trim();
        let recorded = recorded.strip_prefix("sha256:").unwrap_or(recorded);
        recorded.eq_ignore_ascii_case(actual_hex)
    }
}
