//! Terminal UI layer for interactive chat sessions.
//!
//! - [`chat_loop`]: terminal setup, key handling and the event loop that
//!   feeds actions to [`crate::core::app`] and runs their commands.
//! - [`renderer`]: frame layout for the sidebar, transcript, input and
//!   status line.
//! - [`transcript`] and [`markdown`]: markdown to terminal lines and to
//!   sanitized HTML.
//! - [`theme`]: colours and styles.
//!
//! Ownership boundary: this layer presents and captures interaction state,
//! while [`crate::core`] owns thread state and streaming.

pub mod chat_loop;
pub mod markdown;
pub mod renderer;
pub mod theme;
pub mod transcript;
