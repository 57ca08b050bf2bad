#![forbid(unsafe_code)]

//! Identifiers, constants, and record types shared by every layer.

mod error;
mod records;

pub use error::{ErrorKind, LedgerError, Result};
pub use records::{DependentRecord, DisplayFields, EntityRecord, NewDependent, ValidityWindow};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version counter of an iterated entity. Not a timestamp.
pub type Iteration = i64;

/// Iteration stamped on freshly initialized entities.
pub const FIRST_ITERATION: Iteration = 1;

/// `last_iteration` value of an interval that is still in effect.
pub const INFINITY: Iteration = 999_999_999;

/// Number of identifiers resolved by one chunk query.
pub const CHUNK_SIZE: usize = 20;

/// Padding id used to fill short chunks. Never a valid entity or dependent id.
pub const NEVERLAND: &str = "NEVERLAND";

/// Stable logical identifier of an iterated entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

/// Logical identifier of a dependent (link, self-link, or owned child).
///
/// Shared by every interval the dependent has ever had.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependentId(pub String);

macro_rules! string_id {
    ($ty:ident) => {
        impl $ty {
            /// Creates an identifier from anything string-like.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $ty {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $ty {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $ty {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(EntityId);
string_id!(DependentId);
