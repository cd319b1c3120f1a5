//! Core types, traits and lifecycle rules for the identity-card service.
//!
//! This crate has no HTTP or database dependencies.
//! Storage backends implement [`store::CardStore`]; the holder directory and
//! the document renderer are reached through [`holder::HolderDirectory`] and
//! [`render::ArtifactRenderer`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod card;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod generate;
pub mod holder;
pub mod lifecycle;
pub mod number;
pub mod render;
pub mod store;

pub use error::{Error, ErrorKind, Result};
