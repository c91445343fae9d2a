#![forbid(unsafe_code)]

//! Durable store adapters for the assessment engine.
//!
//! `repository` defines the backend-agnostic contracts plus an in-memory
//! implementation; `sqlite` provides the production backend.

pub mod repository;
pub mod sqlite;
