//! Delivery Module
//!
//! Hand-off point between a completed DATA transaction and the delivery backend.
//!
//! ```text
//! Session (DATA complete)
//!        │ submit(Envelope)
//!        ▼
//! ┌─────────────────┐      ┌─────────────────┐
//! │ DeliveryQueue   │─────>│ DeliveryWorker  │
//! │ (mpsc sender)   │      │ (Tokio task)    │
//! └─────────────────┘      └─────────────────┘
//! ```

pub mod queue;
pub mod worker;

// Re-export commonly used types
pub use queue::{DeliveryError, DeliveryQueue, Envelope};
pub use worker::DeliveryWorker;
