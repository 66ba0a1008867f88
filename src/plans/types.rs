//! Plan catalog and active-instance types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::AccountId;

pub const SECS_PER_DAY: i64 = 86_400;

/// Catalog entry. Immutable once seeded; read-only to accrual logic.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Plan {
    pub id: u64,
    pub name: String,
    pub stake: Decimal,
    /// Daily ROI as a percentage of the stake (20 means 20%/day)
    pub daily_roi: Decimal,
    pub duration_days: i64,
}

/// One user's commitment to a plan. Stake/rate/name are snapshotted at
/// open time so later catalog edits never change a running instance.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ActivePlanInstance {
    pub id: u64,
    pub account_id: AccountId,
    pub plan_id: u64,
    pub plan_name: String,
    pub stake: Decimal,
    pub daily_roi: Decimal,
    pub started_at: i64,
    pub ends_at: i64,
    /// None until the first accrual; always a whole number of days past
    /// `started_at` afterwards.
    pub last_credited_at: Option<i64>,
    pub completed: bool,
}

impl ActivePlanInstance {
    /// The timestamp daily elapsed time is measured from.
    pub fn accrual_base(&self) -> i64 {
        self.last_credited_at.unwrap_or(self.started_at)
    }

    /// ROI owed for one elapsed day.
    pub fn daily_amount(&self) -> Decimal {
        self.stake * self.daily_roi / Decimal::from(100)
    }
}
