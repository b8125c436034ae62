//! HTTP-surface routers: everything that runs before a session exists.

pub mod error;
