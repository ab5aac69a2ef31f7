use thiserror::Error;

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

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// # Error Categories
///
/// ## Decoding Errors
/// - [`Error::Malformed`] - Corrupted serialization stream or class file
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of the input
/// - [`Error::NotSupported`] - Stream feature this library does not decode
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::RecursionLimit`] - Nesting deeper than the decoder allows
///
/// ## Rewrite Errors
/// - [`Error::NotFound`] - A rewrite or lookup matched nothing
///
/// ## I/O and Other Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::Error`] - Miscellaneous failures
///
/// # Examples
///
/// ```rust
/// use jgadget::{Error, serial};
///
/// match serial::decode(&[0xAC, 0xED, 0x00, 0x05, 0x70]) {
///     Ok(graph) => println!("{} root(s)", graph.roots().len()),
///     Err(Error::Malformed { message, file, line }) => {
///         eprintln!("Malformed stream: {} ({}:{})", message, file, line);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be decoded.
    ///
    /// Raised for unknown type codes, dangling handles, broken constant pools and
    /// similar structural problems. The error carries the source location where the
    /// malformation was detected.
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

    /// An out of bound access was attempted while reading the input.
    #[error("Out of Bound read would have occurred! - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// The stream uses a feature that is not decoded.
    ///
    /// Serialized exceptions (`TC_EXCEPTION`) and externalizable class data written
    /// without block-data mode fall into this category.
    #[error("This stream feature is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),

    /// A rewrite or lookup did not match anything.
    ///
    /// Rewriters return this when their replacement budget was never touched, and
    /// the catalog returns it for unknown template names or unset parameters. The
    /// associated value describes what was searched for.
    #[error("Nothing matched - {0}")]
    NotFound(String),

    /// Recursion limit reached.
    ///
    /// The decoder enforces a maximum nesting depth so that hostile streams cannot
    /// overflow the stack. The associated value is the limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
}
