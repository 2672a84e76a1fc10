//! Generation client and its builder

mod builder;
mod client;
pub mod prompts;

pub use builder::{GenerationClientBuilder, GenerationSettings};
pub use client::GenerationClient;
