// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
// - 'file/mod.rs' maps module images read-only into memory

//! # dotweave
//!
//! Call-redirection instrumentation for CIL modules. `dotweave` takes a compiled module
//! described by ECMA-335 style metadata and makes its methods interceptable, either by
//! rebuilding the selected types as a fresh live assembly or by rewriting the module in place.
//! Woven methods run at nearly full speed while nothing is registered and route every call
//! through an ordered interceptor chain once something is.
//!
//! ## Features
//!
//! - **🔗 Two-way symbol resolution** - Symbolic metadata references mapped to live handles and back
//! - **🏗️ Staged module building** - Declare, resolve, metadata and body passes in a fixed order
//! - **🔁 Instruction transcoding** - Every operand kind, multi-way branches and exception regions
//! - **🪡 Call-redirection weaving** - A one-load fast path and a boxing slow path sharing one exit
//! - **🧵 Interceptor chains** - Ordered, thread-safe registration with a single global lock
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::{path::Path, sync::Arc};
//! use dotweave::prelude::*;
//!
//! let domain = Domain::new()?;
//! let instrumenter = Instrumenter::new(TypeFilter::name_contains("Sample"));
//! let assembly = instrumenter.instrument_and_load(&domain, Some(Path::new("Sample.dll")), None)?;
//!
//! let method = domain.find_method(assembly.name(), "Sample.C", "M")?;
//! domain.add_interceptor(method, Arc::new(|invocation: &mut Invocation| {
//!     println!("Calling {}", invocation.method().handle.index);
//!     invocation.proceed()
//! }))?;
//! # Ok::<(), dotweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The static module model and its binary image
//! - [`disassembler`] - The static instruction set and IL byte coding
//! - [`emit`] - The live module model: handles, code writer and assembly builder
//! - [`instrument`] - Resolver, transcoder, staged builder, weaver and the [`Instrumenter`]
//! - [`runtime`] - The execution [`Domain`] and the interceptor chain
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Build errors abort the whole build, so no partial module is ever registered or written:
//!
//! ```rust,no_run
//! use dotweave::{Domain, Error, Instrumenter, TypeFilter};
//!
//! let domain = Domain::new()?;
//! let instrumenter = Instrumenter::new(TypeFilter::all());
//! match instrumenter.instrument_and_load(&domain, Some("Sample.dll".as_ref()), None) {
//!     Ok(assembly) => println!("Loaded {}", assembly.name()),
//!     Err(Error::UnresolvedSymbol(symbol)) => println!("Cannot resolve {}", symbol),
//!     Err(Error::UnsupportedConstruction(shape)) => println!("Unsupported: {}", shape),
//!     Err(e) => println!("Error: {}", e),
//! }
//! # Ok::<(), dotweave::Error>(())
//! ```
#[macro_use]
pub(crate) mod error;
pub(crate) mod file;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use dotweave::prelude::*;
///
/// let domain = Domain::new()?;
/// let assembly = domain.load_file("Sample.dll".as_ref())?;
/// println!("{} types", assembly.types().len());
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod prelude;

/// The static CIL instruction set based on ECMA-335
///
/// The opcode table is data: every [`disassembler::OpCode`] has one [`disassembler::OpCodeInfo`]
/// row with its mnemonic, encoding, operand type and flow type. The decoder and encoder
/// translate between IL bytes and instructions with metadata tokens as operands.
pub mod disassembler;

/// The live module model
///
/// Live type, method and field handles, the live instruction set with its mapping from the
/// static one, the [`emit::CodeWriter`] and the [`emit::AssemblyBuilder`] with its in-progress
/// side-table. Sealing a builder yields a [`emit::LoadedAssembly`].
pub mod emit;

/// Making static assemblies interceptable
pub mod instrument;

/// The static module model: definitions, symbolic references and the binary image
pub mod metadata;

/// Execution domain, interpreter and interceptor chain
pub mod runtime;

/// `dotweave` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotweave` Error type
///
/// The main error type for all operations in this crate.
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{Domain, Error};
///
/// let domain = Domain::new()?;
/// match domain.load_file("Sample.dll".as_ref()) {
///     Ok(assembly) => println!("Loaded {}", assembly.name()),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// # Ok::<(), dotweave::Error>(())
/// ```
pub use error::Error;

/// Front end of the instrumentation pipeline and its configuration.
pub use instrument::{InstrumentOptions, Instrumenter, Strategy, TypeFilter};

/// The execution domain.
pub use runtime::Domain;

/// Byte-level parsing and writing used by the image reader and writer.
pub use file::{parser::Parser, writer::Writer};
