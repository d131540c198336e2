//! Module for core business logic services.
//!
//! This module encapsulates services that perform specific business operations
//! and orchestrate interactions between the store, the database and the
//! notification channel.

pub mod code_service;
pub mod oauth;
pub mod sms;
pub mod user_service;
