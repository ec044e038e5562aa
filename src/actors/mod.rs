//! Actor-based polling
//!
//! Each poll loop runs as an independent tokio task controlled through an
//! mpsc command channel. Results fan out to the UI over a broadcast channel.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌──────────────┐
//!                  │  Hub / UI    │  select, settings, power
//!                  └──────┬───────┘
//!                         │
//!                  ┌──────▼───────┐
//!                  │  Scheduler   │
//!                  └──┬────────┬──┘
//!          spawns/replaces     spawns/stops
//!      ┌──────────────▼──┐  ┌──▼────────────────┐
//!      │ ForegroundPoller│  │ BackgroundMonitor │
//!      │ (viewed server) │  │ (monitored set)   │
//!      └────────┬────────┘  └────────┬──────────┘
//!               └─────────┬──────────┘
//!                  ┌──────▼───────┐     per-server
//!                  │   Pipeline   │◄──► state cells
//!                  └──────┬───────┘
//!                         │ HubEvent
//!                  ┌──────▼───────┐
//!                  │  Broadcast   │ → UI, sinks
//!                  └──────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: each actor has an mpsc command channel for control
//! 2. **Events**: samples, history and notifications are broadcast
//! 3. **Request/Response**: oneshot channels for `PollNow`

pub mod background;
pub mod cells;
pub mod foreground;
pub mod messages;
pub mod pipeline;
pub mod scheduler;

pub use background::BackgroundHandle;
pub use foreground::ForegroundHandle;
pub use messages::{HubEvent, PollOrigin, SampleEvent};
pub use pipeline::{CycleReport, Pipeline};
pub use scheduler::{PollTiming, Scheduler};
