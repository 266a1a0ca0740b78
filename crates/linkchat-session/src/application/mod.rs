//! Application layer: the use cases that orchestrate the adapters.
//!
//! - **`message_router`** – Owns the session log: attribution, ordering,
//!   local echo, audio forwarding, and snapshot publication.
//!
//! - **`chat_session`** – The facade a presentation layer drives; wires one
//!   connection manager, one router, and the audio boundary together.

pub mod chat_session;
pub mod message_router;

pub use chat_session::ChatSession;
pub use message_router::MessageRouter;
