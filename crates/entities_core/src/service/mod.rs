//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into use-case level APIs.
//! - Keep CLI and sync callers decoupled from storage details.

pub mod entities_service;
