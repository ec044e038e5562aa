use crate::ServerStatus;

/// How the status moved since the last recorded observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Same status, or nothing recorded yet to compare against
    Unchanged,
    WentOffline,
    CameOnline,
    /// Any other change (suspended, unknown)
    Changed(ServerStatus),
}

impl StatusTransition {
    pub fn evaluate(previous: Option<ServerStatus>, current: ServerStatus) -> StatusTransition {
        match previous {
            None => StatusTransition::Unchanged,
            Some(previous) if previous == current => StatusTransition::Unchanged,
            Some(_) => match current {
                ServerStatus::Offline => StatusTransition::WentOffline,
                ServerStatus::Running => StatusTransition::CameOnline,
                other => StatusTransition::Changed(other),
            },
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, StatusTransition::Unchanged)
    }
}
