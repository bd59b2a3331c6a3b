//! Caller-facing event types.

pub mod events;
