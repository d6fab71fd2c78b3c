//! Route handlers.

pub mod transcribe;
