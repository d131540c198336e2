//! Authentication module for accounts, sessions and access control.
//!
//! This module provides the public interface for signup, login (password and
//! SMS code), token refresh, logout and the gate middleware protecting every
//! other route.

pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod service;
pub mod session;
pub mod state;
