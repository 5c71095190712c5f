//! Session management.
//!
//! The backend issues an opaque access token at login. This module keeps
//! that token on disk so the map data can be fetched on later runs.
//! Obtaining the token is handled elsewhere.

pub mod session;

pub use session::{Session, SessionData};
