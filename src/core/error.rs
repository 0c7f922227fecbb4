use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("message of {len} bytes is outside 1..={max}")]
    MessageTooLarge { len: usize, max: usize },
    #[error("operation would block")]
    WouldBlock,
    #[error("interrupted while waiting")]
    Interrupted,
    #[error("buffer too small: head message needs {required} bytes, buffer holds {available}")]
    BufferTooSmall { required: usize, available: usize },
    #[error("unsupported control command {0}")]
    NotSupported(u32),
    #[error("no mail slot with minor number {minor} (supported range 0..{max_minor})")]
    NoSuchMailslot { minor: u32, max_minor: u32 },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// POSIX error number the character-device driver reported for this condition.
    pub fn errno(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) | Error::Config(_) => libc::EINVAL,
            Error::MessageTooLarge { .. } => libc::EMSGSIZE,
            Error::WouldBlock => libc::EAGAIN,
            Error::Interrupted => libc::EINTR,
            Error::BufferTooSmall { .. } => libc::ENOBUFS,
            Error::NotSupported(_) => libc::ENOTTY,
            Error::NoSuchMailslot { .. } => libc::ENODEV,
            Error::Io(err) => err.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// True for failures a caller may retry without changing its request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::WouldBlock | Error::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
