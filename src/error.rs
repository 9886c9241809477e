use thiserror::Error;

/// Errors reported when constructing a [`ConcurrentMap`](crate::ConcurrentMap).
///
/// Keys and values can never be "null" in Rust, so the only invalid arguments left
/// are the sizing parameters.
#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum Error {
    #[error("invalid initial capacity {0}: must be greater than zero")]
    InvalidCapacity(usize),
    #[error("invalid load factor {0}: must be finite and greater than zero")]
    InvalidLoadFactor(f32),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
