pub mod error;
pub mod iterable;
pub mod result;
pub mod session;
