//! Remote generation providers and the retry policy applied to them.
//!
//! The generation client talks to the remote service only through the
//! narrow [`RemoteGenerator`] trait, so tests substitute scripted doubles
//! and deployments plug in [`GeminiGenerator`] (feature `gemini`) or the
//! offline [`MockGenerator`].

pub mod mock;
pub mod retry;
pub mod traits;

#[cfg(feature = "gemini")]
pub mod gemini;

#[cfg(feature = "gemini")]
pub use gemini::GeminiGenerator;
pub use mock::MockGenerator;
pub use retry::RetryConfig;
pub use traits::{GenerationParams, RemoteGenerator, RemoteOutput};
