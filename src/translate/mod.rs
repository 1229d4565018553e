//! Translation between the vendor API shapes and the plain-text chat backend.
//!
//! Inbound requests are flattened into a single prompt string; backend replies
//! (whole or fragmented) are re-shaped into each vendor's response and event
//! formats. All functions here are pure (no I/O).

pub mod claude_types;
pub mod openai_types;
pub mod request;
pub mod response;
pub mod streaming;
