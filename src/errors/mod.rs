//! Error types for each pipeline component.
mod push;
mod source;
mod store;
mod task;

pub use push::PushError;
pub use source::SourceError;
pub use store::StoreError;
pub use task::TaskError;
