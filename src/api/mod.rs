//! API response types and pagination utilities

pub mod pagination;
pub mod response;
