use thiserror::Error;

use crate::runtime::ObjectRef;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! invalid_operation {
    ($msg:expr) => {
        crate::Error::InvalidOperation($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvalidOperation(format!($fmt, $($arg)*))
    };
}

macro_rules! unresolved {
    ($msg:expr) => {
        crate::Error::UnresolvedSymbol($msg.to_string())
    };

    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::UnresolvedSymbol(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Build-time failures (resolution, construction, transcoding) always abort the whole build or
/// rewrite; no partial module is ever produced. Run-time failures raised by interpreted code
/// surface as [`Error::Exception`] and travel through interceptor chains untouched.
///
/// # Error Categories
///
/// ## Build Errors
/// - [`Error::UnresolvedSymbol`] - A symbolic reference could not be mapped to a live handle
/// - [`Error::UnsupportedConstruction`] - A type shape outside the modeled subset
/// - [`Error::UnsupportedInstruction`] - An opcode/operand combination outside the modeled subset
/// - [`Error::InvalidOperation`] - A staging invariant was violated
///
/// ## Interception Errors
/// - [`Error::NotInterceptable`] - The method was never woven
///
/// ## File Errors
/// - [`Error::Malformed`] - Corrupted or invalid module image
/// - [`Error::OutOfBounds`] - Attempted to read beyond the image boundaries
/// - [`Error::FileError`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust,no_run
/// use dotweave::{Domain, Error, Instrumenter, TypeFilter};
/// use std::path::Path;
///
/// let domain = Domain::new()?;
/// let instrumenter = Instrumenter::new(TypeFilter::all());
/// match instrumenter.instrument_and_load(&domain, Some(Path::new("Sample.dll")), None) {
///     Ok(assembly) => println!("loaded {}", assembly.name()),
///     Err(Error::UnsupportedConstruction(what)) => eprintln!("cannot clone: {what}"),
///     Err(e) => eprintln!("failed: {e}"),
/// }
/// # Ok::<(), dotweave::Error>(())
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// A symbolic reference could not be mapped to a live handle.
    ///
    /// Raised for unknown modules or assemblies, missing members and ambiguous overloads.
    /// The resolver never picks a best guess.
    #[error("Unresolved symbol - {0}")]
    UnresolvedSymbol(String),

    /// A type shape that is not modeled (function pointer, pinned, custom modifiers, sentinel).
    #[error("Unsupported construction - {0}")]
    UnsupportedConstruction(String),

    /// An opcode/operand combination that has no live counterpart.
    #[error("Unsupported instruction - {0}")]
    UnsupportedInstruction(String),

    /// The method lacks the stub slot / target method pair produced by weaving.
    #[error("Method is not interceptable - {0}")]
    NotInterceptable(String),

    /// A member expected in a live module's side-table is absent, or a staging rule was broken.
    #[error("Invalid operation - {0}")]
    InvalidOperation(String),

    /// A required argument was not supplied.
    #[error("Missing required argument - {0}")]
    MissingArgument(&'static str),

    /// The module image is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing the image.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// A feature of the image or of interpreted code that is not implemented.
    #[error("Not supported - {0}")]
    NotSupported(String),

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Recursive resolution exceeded the configured depth.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// Failed to lock target.
    #[error("Failed to lock target")]
    LockError,

    /// A managed exception thrown by interpreted code.
    ///
    /// Propagates through `Invocation::proceed` unmodified so code under test observes its
    /// ordinary failure semantics.
    #[error("Unhandled managed exception - {0:?}")]
    Exception(ObjectRef),
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Error::LockError
    }
}
