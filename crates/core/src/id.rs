// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container and process identifiers
//!
//! Both IDs are client-supplied opaque strings: a [`ContainerId`] is unique
//! per daemon instance, a [`ProcessId`] is unique within its container. The
//! literal key `"init"` always denotes a container's primary process.

use serde::{Deserialize, Serialize};

/// Define a newtype wrapper around a client-supplied string identifier.
///
/// Generates `new()`, `as_str()`, `is_empty()`, `Display`, the `From`
/// conversions, `PartialEq<str>`, `Borrow<str>`, and `Deref`.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Client-provided container identifier, unique per daemon instance.
    pub struct ContainerId;
}

define_id! {
    /// Process identifier within a container. `"init"` is reserved for the
    /// container's primary process.
    pub struct ProcessId;
}

impl ProcessId {
    /// The reserved id of a container's primary process.
    pub const INIT: &'static str = "init";

    /// The id of a container's primary process.
    pub fn init() -> Self {
        Self(Self::INIT.to_string())
    }

    /// Whether this id denotes the container's primary process.
    pub fn is_init(&self) -> bool {
        self.0 == Self::INIT
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
