//! Application boundary types.

pub mod error;
