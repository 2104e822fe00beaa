//! optsignal
//!
//! Offline options mispricing engine. The binary in `main.rs` is a thin
//! JSON front end over [`engine`].

pub mod engine;
