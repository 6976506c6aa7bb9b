//! Language server surface for grizzly feature files.
//!
//! Provides completion for keywords, steps, variables and enumerated
//! arguments, hover help, go-to-definition, and per-document diagnostics.

pub mod completion;
pub mod definition;
pub mod diagnostics;
pub mod hover;
pub mod scanner;
mod server;

pub use server::{serve_stdio, serve_tcp, RebuildState, ServerOptions};
