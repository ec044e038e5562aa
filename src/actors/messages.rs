//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to one actor via mpsc
//! 2. **Events**: Broadcast notifications for every subscriber (the UI)
//! 3. **Immutability**: Events are cloneable for multi-subscriber patterns

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::ServerSnapshot;
use crate::alerts::Notification;
use crate::coordinator::Source;
use crate::error::MonitorResult;
use crate::storage::HistoryEvent;

/// Which loop produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOrigin {
    Foreground,
    Background,
}

/// Fresh sample for one server
#[derive(Debug, Clone)]
pub struct SampleEvent {
    pub server_id: String,
    pub snapshot: ServerSnapshot,
    pub source: Source,
    pub origin: PollOrigin,
    pub timestamp: DateTime<Utc>,
}

/// Everything the engine publishes to the UI
///
/// The broadcast channel may lag or drop events for slow subscribers. That
/// is acceptable: samples are continuously regenerated and history can be
/// re-read from the store.
#[derive(Debug, Clone)]
pub enum HubEvent {
    Sample(SampleEvent),
    Notification(Notification),
    HistoryAppended {
        server_id: String,
        event: HistoryEvent,
    },
    /// The API key was rejected; the session has to end
    AuthFailed { server_id: String },
}

/// Commands for a foreground poller
#[derive(Debug)]
pub enum PollerCommand {
    /// Run a cycle right away, bypassing the timer
    PollNow {
        respond_to: oneshot::Sender<MonitorResult<()>>,
    },

    /// Finish the in-flight cycle and exit
    Shutdown,
}

/// Commands for the background monitor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a full cycle right away, responds with the number of servers polled
    PollNow {
        respond_to: oneshot::Sender<MonitorResult<usize>>,
    },

    /// Answered only by a monitor that will start another cycle
    Ping { respond_to: oneshot::Sender<()> },

    Shutdown,
}
