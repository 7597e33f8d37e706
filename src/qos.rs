//! Prefetch (QoS) negotiation tracking.
//!
//! Each scope — the whole connection, or one channel — may have at most one
//! QoS negotiation in flight. A second request while one is outstanding is
//! refused so the acknowledgement can never be ambiguous. Until the server
//! confirms, the previously confirmed values stay authoritative.

use tracing::debug;

/// Prefetch limits for one scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QosSettings {
    /// Prefetch window in octets; 0 means no size limit.
    pub prefetch_size: u32,
    /// Prefetch window in messages; 0 means no count limit.
    pub prefetch_count: u16,
}

/// Whether a QoS negotiation applies to one channel or the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QosScope {
    /// Limits shared across every channel of the connection.
    Connection,
    /// Limits for a single channel.
    Channel,
}

/// Tracks the confirmed and the in-flight prefetch limits of one scope.
#[derive(Clone, Copy, Debug, Default)]
pub struct QosTracker {
    active: QosSettings,
    pending: Option<QosSettings>,
}

impl QosTracker {
    /// Register a new negotiation.
    ///
    /// Returns `false` without side effects while a previous negotiation is
    /// still unacknowledged.
    pub fn request(&mut self, settings: QosSettings) -> bool {
        if self.pending.is_some() {
            debug!(?settings, "qos request refused: negotiation outstanding");
            return false;
        }
        self.pending = Some(settings);
        true
    }

    /// Promote the pending limits after the matching acknowledgement.
    ///
    /// Returns the now-active settings, or `None` when nothing was pending.
    pub fn acknowledge(&mut self) -> Option<QosSettings> {
        let settings = self.pending.take()?;
        self.active = settings;
        Some(settings)
    }

    /// Drop any in-flight negotiation, keeping the confirmed values.
    ///
    /// Used when the owning scope is torn down before the reply arrives.
    pub fn abandon(&mut self) { self.pending = None; }

    /// The limits currently in force.
    #[must_use]
    pub const fn active(&self) -> QosSettings { self.active }

    /// Whether a negotiation is awaiting its acknowledgement.
    #[must_use]
    pub const fn is_outstanding(&self) -> bool { self.pending.is_some() }
}
