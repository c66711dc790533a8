//! Exception-handler regions of a method body.
//!
//! Boundaries are instruction indices into the owning body's instruction list, with the end
//! of each span exclusive. An end equal to the instruction count means "to the end of the
//! body"; the image codec converts to and from byte offsets.

use bitflags::bitflags;

use crate::metadata::typesystem::TypeReference;

bitflags! {
    /// Clause kind flags as encoded in exception-handling sections (ECMA-335 II.25.4.6).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed catch clause
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause
        const FAULT = 0x0004;
    }
}

/// Decoded clause kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Typed catch
    Catch,
    /// Filter, then catch
    Filter,
    /// Runs on every exit
    Finally,
    /// Runs on exceptional exit only
    Fault,
}

/// One protected region and its handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExceptionHandler {
    /// Clause kind flags
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
    /// Caught type, for catch clauses
    pub catch_type: Option<TypeReference>,
    /// First filter instruction, for filter clauses
    pub filter_start: Option<usize>,
}

impl ExceptionHandler {
    /// A typed catch clause.
    #[must_use]
    pub fn catch(
        try_range: (usize, usize),
        handler_range: (usize, usize),
        catch_type: TypeReference,
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: try_range.0,
            try_end: try_range.1,
            handler_start: handler_range.0,
            handler_end: handler_range.1,
            catch_type: Some(catch_type),
            filter_start: None,
        }
    }

    /// A finally clause.
    #[must_use]
    pub fn finally(try_range: (usize, usize), handler_range: (usize, usize)) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_start: try_range.0,
            try_end: try_range.1,
            handler_start: handler_range.0,
            handler_end: handler_range.1,
            catch_type: None,
            filter_start: None,
        }
    }

    /// A fault clause.
    #[must_use]
    pub fn fault(try_range: (usize, usize), handler_range: (usize, usize)) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FAULT,
            ..ExceptionHandler::finally(try_range, handler_range)
        }
    }

    /// A filter clause; the filter block runs from `filter_start` up to `handler_range.0`.
    #[must_use]
    pub fn filter(
        try_range: (usize, usize),
        filter_start: usize,
        handler_range: (usize, usize),
    ) -> Self {
        ExceptionHandler {
            flags: ExceptionHandlerFlags::FILTER,
            filter_start: Some(filter_start),
            ..ExceptionHandler::finally(try_range, handler_range)
        }
    }

    /// The clause kind.
    #[must_use]
    pub fn kind(&self) -> HandlerKind {
        if self.flags.contains(ExceptionHandlerFlags::FAULT) {
            HandlerKind::Fault
        } else if self.flags.contains(ExceptionHandlerFlags::FINALLY) {
            HandlerKind::Finally
        } else if self.flags.contains(ExceptionHandlerFlags::FILTER) {
            HandlerKind::Filter
        } else {
            HandlerKind::Catch
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(
            ExceptionHandler::catch((0, 2), (2, 4), TypeReference::object()).kind(),
            HandlerKind::Catch
        );
        assert_eq!(ExceptionHandler::finally((0, 2), (2, 4)).kind(), HandlerKind::Finally);
        assert_eq!(ExceptionHandler::fault((0, 2), (2, 4)).kind(), HandlerKind::Fault);
        assert_eq!(ExceptionHandler::filter((0, 2), 2, (4, 6)).kind(), HandlerKind::Filter);
    }
}
