//! Types shared by every HTTP handler.

pub mod common;
