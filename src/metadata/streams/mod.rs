//! Heaps and the stream directory of a module image.
//!
//! Every heap has a read-only view over image bytes and a deduplicating builder used by the
//! image writer:
//!
//! - [`Strings`] / [`StringsBuilder`] - identifiers (`#Strings`)
//! - [`UserStrings`] / [`UserStringsBuilder`] - `ldstr` literals (`#US`)
//! - [`Blob`] / [`BlobBuilder`] - signatures and other binary values (`#Blob`)
//!
//! # Reference
//! - ECMA-335 6th Edition, Partition II, Section 24.2

mod blob;
mod streamheader;
mod strings;
mod userstrings;

pub use blob::{Blob, BlobBuilder};
pub use streamheader::{StreamHeader, STREAM_NAMES};
pub use strings::{Strings, StringsBuilder};
pub use userstrings::{UserStrings, UserStringsBuilder};
