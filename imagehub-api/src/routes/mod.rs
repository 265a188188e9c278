/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login and logout
/// - `users`: Profile, account and role management
/// - `images`: Catalog, collections and favorites
/// - `deploy`: Deployment configuration and providers
/// - `form`: Multipart form parsing shared by upload endpoints

pub mod auth;
pub mod deploy;
pub mod form;
pub mod health;
pub mod images;
pub mod users;
