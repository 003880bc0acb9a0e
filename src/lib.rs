//! Full-page cache gate for storefront front offices.

pub mod application;
pub mod cache;
pub mod config;
pub mod infra;
