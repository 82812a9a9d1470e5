/// Error number of the file system.
#[repr(i32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Errno {
    /// No such file or directory.
    NotFound = 1,
    /// The path already exists.
    Exists = 2,
    /// A directory was expected.
    NotDir = 3,
    /// The operation does not apply to a directory.
    IsDir = 4,
    /// The directory still has entries besides `.` and `..`.
    NotEmpty = 5,
    /// A path component exceeds the 14-character limit.
    NameTooLong = 6,
    /// The disk or an inode ran out of space.
    NoSpace = 7,
    /// Symlink expansion exceeded the traversal bound.
    SymlinkLoop = 8,
    /// The inode is write-denied or otherwise in use.
    Busy = 9,
    /// Malformed argument (empty path, bad offset, bad handle).
    InvalidArgs = 10,
}

/// The error type returned by the file-system APIs.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Error {
    errno: Errno,
    msg: Option<&'static str>,
}

impl Error {
    pub const fn new(errno: Errno) -> Self {
        Error { errno, msg: None }
    }

    pub const fn with_message(errno: Errno, msg: &'static str) -> Self {
        Error {
            errno,
            msg: Some(msg),
        }
    }

    pub const fn error(&self) -> Errno {
        self.errno
    }
}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(errno)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

#[macro_export]
macro_rules! return_errno {
    ($errno: expr) => {
        return core::result::Result::Err($crate::Error::new($errno))
    };
}

#[macro_export]
macro_rules! return_errno_with_message {
    ($errno: expr, $msg: expr) => {
        return core::result::Result::Err($crate::Error::with_message($errno, $msg))
    };
}
