//! Threadline is a terminal chat client that keeps several conversation
//! threads, saves them locally, and streams replies from an Azure OpenAI
//! chat-completions deployment.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the thread store and its persistence, configuration, the
//!   streaming completion client, and the application controller.
//! - [`ui`] renders the terminal interface, runs the interactive event loop,
//!   and turns markdown into terminal lines or sanitized HTML.
//! - [`api`] defines the request and streamed response payloads.
//! - [`cli`] parses arguments and dispatches subcommands.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
