//! The static module model and its binary image.
//!
//! This is the file-described side of the system: a [`definitions::StaticAssembly`] is a
//! read-only tree of definitions whose cross-references are symbolic ([`typesystem`] and
//! [`members`]), with method bodies kept as instruction lists over index branch targets.
//!
//! # Key Components
//!
//! - [`definitions`] - assemblies, modules, types and their members
//! - [`typesystem`] - symbolic type references and element codes
//! - [`members`] - field and method references
//! - [`method`] - method bodies, instructions and exception regions
//! - [`signatures`] - ECMA-335 signature blobs
//! - [`customattributes`] and [`security`] - attribute and permission-set blobs
//! - [`image`] - the binary module image, with [`streams`] heaps and [`token`] addressing
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotweave::metadata::definitions::StaticAssembly;
//!
//! let assembly = StaticAssembly::from_file("tests/samples/Sample.dwmi".as_ref())?;
//! for module in &assembly.modules {
//!     println!("{}: {} types", module.name, module.type_count());
//! }
//! # Ok::<(), dotweave::Error>(())
//! ```

/// Custom attribute values and their blob encoding
pub mod customattributes;
/// Assembly, module, type and member definitions
pub mod definitions;
/// Binary module image reader and writer
pub mod image;
/// Symbolic field and method references
pub mod members;
/// Method bodies, instructions and exception regions
pub mod method;
/// Embedded resources
pub mod resources;
/// Declarative security and permission sets
pub mod security;
/// Method, field, property and local signatures
pub mod signatures;
/// Heaps and the stream directory of an image
pub mod streams;
/// Metadata tokens
pub mod token;
/// Symbolic type references
pub mod typesystem;
