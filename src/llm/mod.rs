pub mod client;
pub mod models;
pub mod prompts;
pub mod recover;

pub use client::LlmClient;
pub use models::Model;
pub use recover::{recover, strip_code_fences, RecoveryFailure};
