//! Client-side conversation store for the Scribe chat backend.
//!
//! The store owns the conversation list, the active conversation's messages and the
//! loading flags, and folds every backend response (including streamed AI replies)
//! into a single observable state snapshot.

// Interdiction stricte de pratiques dangereuses ou non idiomatiques
#![deny(unsafe_code)] // Le code unsafe est interdit
#![deny(missing_docs)] // Toute fonction, struct, enum ou module public doit être documenté
#![deny(non_camel_case_types)]
#![deny(unused_must_use)] // Oblige à gérer explicitement les Result et Option
#![deny(nonstandard_style)] // Empêche tout style de code non standard
#![forbid(unsafe_op_in_unsafe_fn)]
// Clippy pour stricte discipline
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)] // Interdit unwrap()
#![deny(clippy::expect_used)] // Interdit expect()
#![deny(clippy::panic)] // Interdit panic!()
#![deny(clippy::print_stdout)] // Interdit println!() en production
#![deny(clippy::todo)]
#![deny(clippy::redundant_clone)]
#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

/// Backend HTTP client: configuration, wire types, errors and the chat stream.
#[allow(clippy::missing_errors_doc)]
pub mod api;
/// Read-only conversation sharing and the share server.
#[allow(clippy::missing_errors_doc, clippy::unused_async)]
pub mod share;
/// Entry helpers to start the share server.
pub mod start_scribe;
/// The conversation store and its state reducers.
pub mod store;

pub use api::{ApiClient, ApiConfig, ApiError, Backend};
pub use store::{ConversationStore, StoreState};
