use thiserror::Error;

/// Errors the engine can report. Every variant maps to exactly one negative
/// POSIX errno at the adapter boundary (see [`VsfsError::to_errno`]).
#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum VsfsError {
    #[error("no such file")]
    NotFound,

    #[error("path or name too long")]
    NameTooLong,

    #[error("no space left on device")]
    NoSpace,

    #[error("file too big")]
    TooBig,

    #[error("directory listing buffer exhausted")]
    NoMem,

    #[error("path is not absolute")]
    NotAbsolute,

    #[error("superblock magic or size mismatch")]
    InvalidImage,

    #[error("image already formatted; pass the force flag to overwrite")]
    FormatRefused,

    #[error("underlying I/O or clock failure: {0}")]
    Io(&'static str),
}

impl VsfsError {
    /// The negative errno an engine operation returns to its caller, per
    /// the propagation table in §7 of the specification.
    pub fn to_errno(self) -> i32 {
        match self {
            VsfsError::NotFound => -libc_like::ENOENT,
            VsfsError::NameTooLong => -libc_like::ENAMETOOLONG,
            VsfsError::NoSpace => -libc_like::ENOSPC,
            VsfsError::TooBig => -libc_like::EFBIG,
            VsfsError::NoMem => -libc_like::ENOMEM,
            VsfsError::NotAbsolute => -libc_like::ENOENT,
            VsfsError::InvalidImage => -libc_like::EINVAL,
            VsfsError::FormatRefused => -libc_like::EEXIST,
            VsfsError::Io(_) => -libc_like::EIO,
        }
    }
}

/// A tiny, dependency-free mirror of the handful of errno values this crate
/// needs. Kept local so `vsfs-core` stays free of a `libc` dependency; the
/// adapter crates that already depend on `libc` can compare against the real
/// constants, which have the same numeric values on every POSIX target vsfs
/// supports.
mod libc_like {
    pub const ENOENT: i32 = 2;
    pub const EIO: i32 = 5;
    pub const ENOMEM: i32 = 12;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const ENOSPC: i32 = 28;
    pub const EFBIG: i32 = 27;
    pub const ENAMETOOLONG: i32 = 36;
}

pub type VsfsResult<T> = Result<T, VsfsError>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn errno_signs_are_negative() {
        for e in [
            VsfsError::NotFound,
            VsfsError::NameTooLong,
            VsfsError::NoSpace,
            VsfsError::TooBig,
            VsfsError::NoMem,
            VsfsError::InvalidImage,
            VsfsError::FormatRefused,
            VsfsError::Io("mmap"),
        ] {
            assert!(e.to_errno() < 0);
        }
    }
}
