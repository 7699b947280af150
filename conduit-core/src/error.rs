//! Error types.
//!
//! Every violation of the store's usage contract surfaces as one of these
//! variants at the offending call. Nothing is retried or deferred.

use thiserror::Error;

/// Errors produced by the store, the subscription tree and the bindings.
#[derive(Debug, Error)]
pub enum Error {
    /// A handle outlived the store it was created from.
    #[error("the store has been dropped")]
    StoreDropped,

    /// `get_state` was called while the reducer is executing.
    #[error(
        "you may not call get_state() while the reducer is executing; \
         the reducer has already received the state as an argument"
    )]
    IllegalStateAccess,

    /// The dispatched value is not a key-value record.
    #[error("actions must be plain key-value records, got {kind}")]
    InvalidActionShape {
        /// Kind of the value that was dispatched instead.
        kind: &'static str,
    },

    /// The dispatched record has no `type` field, or it is `null`.
    #[error("actions may not have an undefined \"type\" field")]
    MissingActionType,

    /// `dispatch` was called while another dispatch is reducing.
    #[error("reducers may not dispatch actions")]
    ReentrantDispatch,

    /// `subscribe` was called while the reducer is executing.
    #[error("you may not call subscribe() while the reducer is executing")]
    SubscribeDuringDispatch,

    /// An unsubscribe handle was used while the reducer is executing.
    #[error("you may not unsubscribe from a store listener while the reducer is executing")]
    UnsubscribeDuringDispatch,

    /// Two consecutive snapshot reads returned different values.
    #[error("the result of get_snapshot should be cached; consecutive reads returned different values")]
    UncachedSnapshot,

    /// Forced updates kept being requested without the snapshot settling.
    #[error("maximum update depth exceeded: {limit} consecutive forced renders")]
    RenderLoop {
        /// The configured limit that was hit.
        limit: u32,
    },

    /// A typed action could not be converted into a record.
    #[error("failed to serialize action: {0}")]
    Serialize(#[source] serde_json::Error),

    /// A configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[source] serde_json::Error),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
