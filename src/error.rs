//! Custom `Error` and `Result` types for the demangler.

use thiserror::Error;

/// Errors that can occur while demangling a symbol.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// The mangled symbol ends abruptly.
    #[error("mangled symbol ends abruptly")]
    UnexpectedEnd,

    /// The mangled symbol is not well-formed.
    #[error("mangled symbol is not well-formed")]
    UnexpectedText,

    /// Found a back reference that is out-of-bounds of the substitution
    /// table.
    #[error("back reference that is out-of-bounds of the substitution table")]
    BadBackReference,

    /// Found a reference to a template parameter that is either
    /// out-of-bounds, or in a context without template parameters.
    #[error(
        "reference to a template parameter that is either out-of-bounds, or in a context \
         without template parameters"
    )]
    BadTemplateParamReference,

    /// A forward reference into a template-argument list that was still
    /// out-of-bounds once the whole encoding had been parsed.
    #[error("forward reference to a template argument could not be resolved")]
    UnresolvedForwardReference,

    /// An overflow would occur when parsing an integer in a mangled symbol.
    #[error("an overflow would occur when parsing an integer in a mangled symbol")]
    Overflow,

    /// Encountered too much recursion when parsing the symbol.
    #[error("encountered too much recursion when parsing the symbol")]
    TooMuchRecursion,
}

/// A demangling result of `T` or an [`Error`].
pub type Result<T> = core::result::Result<T, Error>;

#[test]
fn size_of_error() {
    assert_eq!(
        core::mem::size_of::<Error>(),
        1,
        "We should keep the size of our Error type in check"
    );
}
