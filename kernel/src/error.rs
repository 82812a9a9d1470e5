/// Error number.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Errno {
    EPERM = 1,    /* Operation not permitted */
    ENOENT = 2,   /* No such file or directory */
    ESRCH = 3,    /* No such process */
    EIO = 5,      /* I/O error */
    EBADF = 9,    /* Bad file number */
    ECHILD = 10,  /* No child processes */
    EAGAIN = 11,  /* Try again */
    ENOMEM = 12,  /* Out of memory */
    EFAULT = 14,  /* Bad address */
    EBUSY = 16,   /* Device or resource busy */
    EEXIST = 17,  /* File exists */
    ENOTDIR = 20, /* Not a directory */
    EISDIR = 21,  /* Is a directory */
    EINVAL = 22,  /* Invalid argument */
    EMFILE = 24,  /* Too many open files */
    ENOSPC = 28,  /* No space left on device */
    EROFS = 30,   /* Read-only file system */
    ENOSYS = 38,  /* Invalid system call number */
    ENOTEMPTY = 39, /* Directory not empty */
    ELOOP = 40,   /* Too many symbolic links encountered */
    ENAMETOOLONG = 36, /* File name too long */
}

/// The error type with an errno and an optional static message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
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

impl From<osprey_frame::Error> for Error {
    fn from(frame_error: osprey_frame::Error) -> Self {
        match frame_error {
            osprey_frame::Error::AccessDenied => Error::new(Errno::EPERM),
            osprey_frame::Error::NoMemory => Error::new(Errno::ENOMEM),
            osprey_frame::Error::PageFault => Error::new(Errno::EFAULT),
            osprey_frame::Error::InvalidArgs => Error::new(Errno::EINVAL),
            osprey_frame::Error::IoError => Error::new(Errno::EIO),
            osprey_frame::Error::NotEnoughResources => Error::new(Errno::EAGAIN),
        }
    }
}

impl From<osprey_jfs::Error> for Error {
    fn from(fs_error: osprey_jfs::Error) -> Self {
        use osprey_jfs::Errno as FsErrno;
        let errno = match fs_error.error() {
            FsErrno::NotFound => Errno::ENOENT,
            FsErrno::Exists => Errno::EEXIST,
            FsErrno::NotDir => Errno::ENOTDIR,
            FsErrno::IsDir => Errno::EISDIR,
            FsErrno::NotEmpty => Errno::ENOTEMPTY,
            FsErrno::NameTooLong => Errno::ENAMETOOLONG,
            FsErrno::NoSpace => Errno::ENOSPC,
            FsErrno::SymlinkLoop => Errno::ELOOP,
            FsErrno::Busy => Errno::EBUSY,
            FsErrno::InvalidArgs => Errno::EINVAL,
        };
        Error::new(errno)
    }
}

#[macro_export]
macro_rules! return_errno {
    ($errno: expr) => {
        return core::result::Result::Err($crate::error::Error::new($errno))
    };
}

#[macro_export]
macro_rules! return_errno_with_message {
    ($errno: expr, $msg: expr) => {
        return core::result::Result::Err($crate::error::Error::with_message($errno, $msg))
    };
}
