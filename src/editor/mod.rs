pub mod client;
pub mod protocol;

pub use client::ClientId;
pub use protocol::{EditorRequest, OutboundFrame};
