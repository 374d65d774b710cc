//! Cascading typeahead selection with resilient asynchronous retrieval
//!
//! The crate provides:
//! - [`selector::Selector`]: the generic incremental-search state machine
//! - [`cascade::Cascade`]: N ordered selectors where each committed
//!   selection clears and re-triggers everything downstream
//! - [`cancel::CancelScope`]: epoch-marked cancellation for in-flight work
//! - [`retry::RetryPolicy`] and [`source::CandidateSource`]: the resilient
//!   retrieval seam
//!
//! Rendering, transport framing, and backend process lifecycle are external
//! collaborators and live outside this crate.

pub mod cancel;
pub mod cascade;
pub mod error;
pub mod filter;
pub mod retry;
pub mod selector;
pub mod source;

pub use cancel::{CancelScope, Epoch};
pub use cascade::{
    Cascade, CascadeConfig, CascadeEvent, CascadeHandle, Command, StageSnapshot, StageSpec,
    StageStatus,
};
pub use error::{RetryError, SelectError, SourceError};
pub use filter::{identity_filter, substring_filter, FilterFn};
pub use retry::RetryPolicy;
pub use selector::{FilterGen, Key, KeyOutcome, Selector};
pub use source::{CandidateSource, StaticSource};
