//! Shared sync state types.

/// Sync state published by the scheduler for status indicators.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SyncState {
    /// No valid session, nothing is synced.
    #[default]
    Offline,
    /// A pull or push request is in flight.
    Syncing,
    /// Local favorites match the last confirmed remote state.
    Synced,
    /// The last request failed; a retry may be pending.
    Error,
}
