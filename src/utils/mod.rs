//! The `utils` module provides shared definitions used across the `chatrelay`
//! crate: the error taxonomy and logging setup.

pub mod error;
pub mod logging;

#[cfg(test)]
mod tests;
