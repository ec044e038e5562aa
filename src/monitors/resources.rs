use chrono::{DateTime, Duration, Utc};

/// Outcome of checking one CPU reading against its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuEvaluation {
    /// Below the threshold
    Ok,
    /// Above the threshold but an alert fired within the cooldown
    Throttled,
    /// Above the threshold and the cooldown has passed
    Fire,
}

impl CpuEvaluation {
    /// `cpu >= threshold` fires unless the last alert is at most `cooldown`
    /// old. A reading exactly at the threshold counts as exceeding.
    pub fn evaluate(
        cpu: f32,
        threshold: f32,
        last_fired: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> CpuEvaluation {
        if cpu < threshold {
            return CpuEvaluation::Ok;
        }

        match last_fired {
            Some(last) if now - last <= cooldown => CpuEvaluation::Throttled,
            _ => CpuEvaluation::Fire,
        }
    }
}
