//! # ImageHub API Server Library
//!
//! HTTP layer of ImageHub: user accounts, the image catalog with
//! collections, and deployment lookups.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Extractors whose rejections use the API error body
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
