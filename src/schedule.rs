use crate::error::EngineError;
use crate::model::PlanOutcome;

/// Publish time for batch `batch_index`. A candidate already in the past is
/// re-based to `now + grace * (index + 1)`, keeping corrected batches apart.
/// A time beyond the `i64` range is an `InvalidConfiguration`.
pub fn plan_time(
    anchor: i64,
    batch_index: usize,
    interval_seconds: i64,
    grace_seconds: i64,
    now: i64,
) -> Result<(i64, PlanOutcome), EngineError> {
    let overflow = || {
        EngineError::invalid(format!(
            "publish time of post #{} is out of range",
            batch_index
        ))
    };
    let index = i64::try_from(batch_index).map_err(|_| overflow())?;
    let candidate = index
        .checked_mul(interval_seconds)
        .and_then(|offset| anchor.checked_add(offset))
        .ok_or_else(overflow)?;
    if candidate < now {
        let corrected = index
            .checked_add(1)
            .and_then(|n| n.checked_mul(grace_seconds))
            .and_then(|offset| now.checked_add(offset))
            .ok_or_else(overflow)?;
        Ok((
            corrected,
            PlanOutcome::Corrected {
                original: candidate,
            },
        ))
    } else {
        Ok((candidate, PlanOutcome::OnSchedule))
    }
}
