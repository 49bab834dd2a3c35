use super::error::Error;
use std::result::Result as StdResult;

/// A result using a lazyrange error.
pub type Result<T> = StdResult<T, Error>;
