pub mod capabilities;
pub mod client;
pub mod registry;

pub use client::{LspClient, LspState, PendingKind};
pub use registry::LspRegistry;
