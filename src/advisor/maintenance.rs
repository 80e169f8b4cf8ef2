use crate::limits::{DAY_MS, MAX_WINDOW_DAYS};
use crate::model::*;

use super::AdvisorError;

impl MaintenanceTask {
    /// Scheduled → Completed, recording when it was done and what it cost.
    pub fn complete(&mut self, at: Ms, cost: Option<f64>) -> Result<(), AdvisorError> {
        self.transition(MaintenanceStatus::Completed)?;
        self.completed_at = Some(at);
        self.cost = cost;
        Ok(())
    }

    /// Scheduled → Canceled.
    pub fn cancel(&mut self) -> Result<(), AdvisorError> {
        self.transition(MaintenanceStatus::Canceled)
    }

    fn transition(&mut self, to: MaintenanceStatus) -> Result<(), AdvisorError> {
        if self.status != MaintenanceStatus::Scheduled {
            return Err(AdvisorError::InvalidTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

/// Scheduled tasks due in `[now, now + window_days]`, soonest first.
pub fn upcoming_maintenance(
    tasks: &[MaintenanceTask],
    now: Ms,
    window_days: u32,
) -> Result<Vec<MaintenanceTask>, AdvisorError> {
    if window_days > MAX_WINDOW_DAYS {
        return Err(AdvisorError::InvalidWindow("window too wide"));
    }
    let horizon = now
        .checked_add(i64::from(window_days) * DAY_MS)
        .ok_or(AdvisorError::InvalidTimestamp(now))?;
    Ok(scheduled_sorted(tasks, |t| {
        t.schedule_date >= now && t.schedule_date <= horizon
    }))
}

/// Scheduled tasks whose date already passed, oldest first.
pub fn overdue_maintenance(tasks: &[MaintenanceTask], now: Ms) -> Vec<MaintenanceTask> {
    scheduled_sorted(tasks, |t| t.schedule_date < now)
}

fn scheduled_sorted(
    tasks: &[MaintenanceTask],
    mut keep: impl FnMut(&MaintenanceTask) -> bool,
) -> Vec<MaintenanceTask> {
    let mut picked: Vec<MaintenanceTask> = tasks
        .iter()
        .filter(|t| t.status == MaintenanceStatus::Scheduled && keep(t))
        .cloned()
        .collect();
    picked.sort_by_key(|t| t.schedule_date);
    picked
}
