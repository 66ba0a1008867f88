//! Plan accrual engine
//!
//! Tracks every active plan instance and credits daily ROI into the owning
//! account's ledger, exactly once per elapsed whole day, until maturity.
//! `last_credited_at` always advances by whole days from the instance
//! start, so delayed or repeated sweeps can never drift or double-credit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::registry::PlanRegistry;
use super::types::{ActivePlanInstance, SECS_PER_DAY};
use crate::account::ledger::lock_row;
use crate::account::{AccountId, AccountStore};
use crate::error::ServiceError;
use crate::storage::{keys, Storage};

/// One settled instance from an accrual sweep.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AccrualResult {
    pub instance_id: u64,
    pub account_id: AccountId,
    pub days: i64,
    pub amount: Decimal,
    pub completed: bool,
}

pub struct AccrualEngine {
    instances: RwLock<HashMap<u64, Arc<Mutex<ActivePlanInstance>>>>,
    next_id: AtomicU64,
    registry: Arc<PlanRegistry>,
    accounts: Arc<AccountStore>,
    storage: Option<Arc<Storage>>,
}

impl AccrualEngine {
    pub fn new(registry: Arc<PlanRegistry>, accounts: Arc<AccountStore>) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            registry,
            accounts,
            storage: None,
        }
    }

    pub fn with_storage(
        storage: Arc<Storage>,
        registry: Arc<PlanRegistry>,
        accounts: Arc<AccountStore>,
    ) -> Result<Self, ServiceError> {
        let rows: Vec<ActivePlanInstance> =
            storage.scan_prefix("inst:").map_err(ServiceError::Storage)?;
        let mut instances = HashMap::new();
        let mut max_id = 0;
        for instance in rows {
            max_id = max_id.max(instance.id);
            instances.insert(instance.id, Arc::new(Mutex::new(instance)));
        }
        Ok(Self {
            instances: RwLock::new(instances),
            next_id: AtomicU64::new(max_id + 1),
            registry,
            accounts,
            storage: Some(storage),
        })
    }

    /// Commit funds to a plan: debit the stake and create the instance as
    /// one atomic step. On `InsufficientFunds` nothing is created.
    pub fn open(
        &self,
        account_id: AccountId,
        plan_id: u64,
    ) -> Result<ActivePlanInstance, ServiceError> {
        self.open_at(account_id, plan_id, Utc::now())
    }

    pub fn open_at(
        &self,
        account_id: AccountId,
        plan_id: u64,
        now: DateTime<Utc>,
    ) -> Result<ActivePlanInstance, ServiceError> {
        let plan = self.registry.get(plan_id)?;
        let row = self
            .accounts
            .entry(account_id)
            .ok_or_else(|| ServiceError::not_found("account"))?;
        let mut account = lock_row(&row)?;

        if plan.stake > account.balance {
            return Err(ServiceError::InsufficientFunds);
        }
        let mut debited = account.clone();
        debited.balance -= plan.stake;

        let started_at = now.timestamp();
        let instance = ActivePlanInstance {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            account_id,
            plan_id: plan.id,
            plan_name: plan.name.clone(),
            stake: plan.stake,
            daily_roi: plan.daily_roi,
            started_at,
            ends_at: started_at + plan.duration_days * SECS_PER_DAY,
            last_credited_at: None,
            completed: false,
        };

        // Debit and instance creation land in one write batch; the live
        // row only changes once the batch is down
        if let Some(storage) = &self.storage {
            let entries = vec![
                (
                    keys::account(debited.id),
                    Storage::encode(&debited).map_err(ServiceError::Storage)?,
                ),
                (
                    keys::instance(instance.id),
                    Storage::encode(&instance).map_err(ServiceError::Storage)?,
                ),
            ];
            storage.put_batch(entries).map_err(ServiceError::Storage)?;
        }
        *account = debited;

        self.instances
            .write()
            .map_err(|_| ServiceError::Busy)?
            .insert(instance.id, Arc::new(Mutex::new(instance.clone())));

        Ok(instance)
    }

    /// Sweep every non-terminal instance, crediting whole elapsed days up
    /// to `now` (capped at maturity). Idempotent: re-running with the same
    /// `now` credits nothing further.
    pub fn accrue_due(&self, now: DateTime<Utc>) -> Result<Vec<AccrualResult>, ServiceError> {
        let candidates: Vec<Arc<Mutex<ActivePlanInstance>>> = {
            let map = self.instances.read().map_err(|_| ServiceError::Busy)?;
            map.values().cloned().collect()
        };

        let mut results = Vec::new();
        for row in candidates {
            match self.settle(&row, now) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => {
                    // One bad row must not abort the sweep
                    warn!("Accrual skipped an instance: {}", e);
                }
            }
        }
        Ok(results)
    }

    /// Settle a single instance. Holds the instance lock for the whole
    /// update so concurrent sweeps serialize and recompute zero days due.
    fn settle(
        &self,
        row: &Mutex<ActivePlanInstance>,
        now: DateTime<Utc>,
    ) -> Result<Option<AccrualResult>, ServiceError> {
        let mut instance = lock_row(row)?;
        if instance.completed {
            return Ok(None);
        }

        let now_ts = now.timestamp();
        // Days owed are measured against maturity, never past it
        let effective = now_ts.min(instance.ends_at);
        let base = instance.accrual_base();
        let hours = (effective - base).max(0) / 3600;
        let days = hours / 24;
        let matured = now_ts >= instance.ends_at;

        if days < 1 {
            if matured {
                let mut finished = instance.clone();
                finished.completed = true;
                self.persist_instance(&finished)?;
                *instance = finished;
                return Ok(Some(AccrualResult {
                    instance_id: instance.id,
                    account_id: instance.account_id,
                    days: 0,
                    amount: Decimal::ZERO,
                    completed: true,
                }));
            }
            return Ok(None);
        }

        let amount = instance.daily_amount() * Decimal::from(days);

        let account_row = self
            .accounts
            .entry(instance.account_id)
            .ok_or_else(|| ServiceError::not_found("account"))?;
        let mut account = lock_row(&account_row)?;

        let mut credited = account.clone();
        credited.balance = credited
            .balance
            .checked_add(amount)
            .ok_or_else(|| ServiceError::validation("Balance overflow"))?;

        // Advance by exactly the credited whole days, not to `now`
        let mut advanced = instance.clone();
        advanced.last_credited_at = Some(base + days * SECS_PER_DAY);
        if matured {
            advanced.completed = true;
        }

        // Ledger credit and boundary advance commit together or not at all
        if let Some(storage) = &self.storage {
            let entries = vec![
                (
                    keys::account(credited.id),
                    Storage::encode(&credited).map_err(ServiceError::Storage)?,
                ),
                (
                    keys::instance(advanced.id),
                    Storage::encode(&advanced).map_err(ServiceError::Storage)?,
                ),
            ];
            storage.put_batch(entries).map_err(ServiceError::Storage)?;
        }
        *account = credited;
        *instance = advanced;

        Ok(Some(AccrualResult {
            instance_id: instance.id,
            account_id: instance.account_id,
            days,
            amount,
            completed: instance.completed,
        }))
    }

    fn persist_instance(&self, instance: &ActivePlanInstance) -> Result<(), ServiceError> {
        if let Some(storage) = &self.storage {
            storage
                .put(&keys::instance(instance.id), instance)
                .map_err(ServiceError::Storage)?;
        }
        Ok(())
    }

    /// The caller's instances, oldest first.
    pub fn list_for(&self, account_id: AccountId) -> Vec<ActivePlanInstance> {
        let map = match self.instances.read() {
            Ok(map) => map,
            Err(_) => return Vec::new(),
        };
        let mut out: Vec<ActivePlanInstance> = map
            .values()
            .filter_map(|row| row.lock().ok().map(|i| i.clone()))
            .filter(|i| i.account_id == account_id)
            .collect();
        out.sort_by_key(|i| i.id);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    struct Fixture {
        accounts: Arc<AccountStore>,
        registry: Arc<PlanRegistry>,
        engine: AccrualEngine,
        account_id: AccountId,
        plan_id: u64,
    }

    /// Account with balance 1000 and a 100-stake, 20%/day, 30-day plan
    fn fixture() -> Fixture {
        let accounts = Arc::new(AccountStore::new("tmdf28dns"));
        let account = accounts
            .create_account("a@x.com", "secure_password_123", None, None)
            .unwrap();
        let registry = Arc::new(PlanRegistry::new());
        let plan = registry
            .insert("Gold", Decimal::from(100), Decimal::from(20), 30)
            .unwrap();

        let ledger = crate::account::Ledger::new(accounts.clone());
        ledger.credit(account.id, Decimal::from(1000)).unwrap();

        let engine = AccrualEngine::new(registry.clone(), accounts.clone());
        Fixture {
            accounts,
            registry,
            engine,
            account_id: account.id,
            plan_id: plan.id,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn balance(f: &Fixture) -> Decimal {
        f.accounts.get(f.account_id).unwrap().balance
    }

    #[test]
    fn test_open_debits_stake() {
        let f = fixture();
        let instance = f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();

        assert_eq!(balance(&f), Decimal::from(900));
        assert_eq!(instance.stake, Decimal::from(100));
        assert_eq!(instance.started_at, t0().timestamp());
        assert_eq!(instance.ends_at, t0().timestamp() + 30 * SECS_PER_DAY);
        assert_eq!(instance.last_credited_at, None);
    }

    #[test]
    fn test_open_insufficient_funds_creates_nothing() {
        let f = fixture();
        let expensive = f
            .registry
            .insert("Whale", Decimal::from(5000), Decimal::from(10), 30)
            .unwrap();

        assert_eq!(
            f.engine
                .open_at(f.account_id, expensive.id, t0())
                .unwrap_err(),
            ServiceError::InsufficientFunds
        );
        assert_eq!(balance(&f), Decimal::from(1000));
        assert!(f.engine.list_for(f.account_id).is_empty());
    }

    #[test]
    fn test_open_unknown_plan() {
        let f = fixture();
        assert!(matches!(
            f.engine.open_at(f.account_id, 999, t0()).unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[test]
    fn test_three_days_credits_sixty() {
        let f = fixture();
        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();

        let results = f.engine.accrue_due(t0() + Duration::days(3)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].days, 3);
        assert_eq!(results[0].amount, Decimal::from(60));
        assert!(!results[0].completed);

        // 900 after stake + 60 ROI
        assert_eq!(balance(&f), Decimal::from(960));
        let instance = &f.engine.list_for(f.account_id)[0];
        assert_eq!(
            instance.last_credited_at,
            Some((t0() + Duration::days(3)).timestamp())
        );
    }

    #[test]
    fn test_rerun_same_now_is_idempotent() {
        let f = fixture();
        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();

        let now = t0() + Duration::days(3);
        f.engine.accrue_due(now).unwrap();
        let after_first = balance(&f);

        let results = f.engine.accrue_due(now).unwrap();
        assert!(results.is_empty());
        assert_eq!(balance(&f), after_first);
    }

    #[test]
    fn test_partial_days_floor() {
        let f = fixture();
        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();

        // 36h elapsed: exactly one whole day owed
        let results = f.engine.accrue_due(t0() + Duration::hours(36)).unwrap();
        assert_eq!(results[0].days, 1);
        assert_eq!(results[0].amount, Decimal::from(20));
        let instance = &f.engine.list_for(f.account_id)[0];
        assert_eq!(
            instance.last_credited_at,
            Some((t0() + Duration::days(1)).timestamp())
        );

        // 11 more hours (47h total): still less than the next boundary
        let results = f.engine.accrue_due(t0() + Duration::hours(47)).unwrap();
        assert!(results.is_empty());
        assert_eq!(balance(&f), Decimal::from(920));
    }

    #[test]
    fn test_delayed_sweep_catches_up_whole_days() {
        let f = fixture();
        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();

        f.engine.accrue_due(t0() + Duration::days(3)).unwrap();
        // Scheduler was down for a week and a half-day
        let results = f
            .engine
            .accrue_due(t0() + Duration::days(10) + Duration::hours(12))
            .unwrap();
        assert_eq!(results[0].days, 7);
        assert_eq!(results[0].amount, Decimal::from(140));
        // Boundary stays day-aligned despite the odd sweep time
        let instance = &f.engine.list_for(f.account_id)[0];
        assert_eq!(
            instance.last_credited_at,
            Some((t0() + Duration::days(10)).timestamp())
        );
    }

    #[test]
    fn test_lifetime_capped_at_maturity() {
        let f = fixture();
        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();

        // Sweep past the end: owed days stop at maturity
        let results = f.engine.accrue_due(t0() + Duration::days(31)).unwrap();
        assert_eq!(results[0].days, 30);
        assert_eq!(results[0].amount, Decimal::from(600));
        assert!(results[0].completed);
        assert_eq!(balance(&f), Decimal::from(1500));

        // Terminal: later sweeps credit nothing
        let results = f.engine.accrue_due(t0() + Duration::days(40)).unwrap();
        assert!(results.is_empty());
        assert_eq!(balance(&f), Decimal::from(1500));
    }

    #[test]
    fn test_daily_sweeps_total_matches_formula() {
        let f = fixture();
        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();

        // One sweep per simulated day for 45 days
        for day in 1..=45 {
            f.engine.accrue_due(t0() + Duration::days(day)).unwrap();
        }

        // S * R/100 * min(N, D) = 100 * 0.20 * 30
        assert_eq!(balance(&f), Decimal::from(900) + Decimal::from(600));
        let instance = &f.engine.list_for(f.account_id)[0];
        assert!(instance.completed);
        assert_eq!(instance.last_credited_at, Some(instance.ends_at));
    }

    #[test]
    fn test_concurrent_sweeps_credit_once() {
        let f = fixture();
        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();
        let engine = Arc::new(f.engine);

        let now = t0() + Duration::days(5);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                std::thread::spawn(move || engine.accrue_due(now).unwrap())
            })
            .collect();
        let mut credited = Decimal::ZERO;
        for handle in handles {
            for result in handle.join().unwrap() {
                credited += result.amount;
            }
        }

        // Exactly one sweep won; 5 days * 20
        assert_eq!(credited, Decimal::from(100));
        assert_eq!(
            f.accounts.get(f.account_id).unwrap().balance,
            Decimal::from(1000)
        );
    }

    #[test]
    fn test_two_accounts_settle_independently() {
        let f = fixture();
        let other = f
            .accounts
            .create_account("b@x.com", "secure_password_123", None, None)
            .unwrap();
        let ledger = crate::account::Ledger::new(f.accounts.clone());
        ledger.credit(other.id, Decimal::from(200)).unwrap();

        f.engine.open_at(f.account_id, f.plan_id, t0()).unwrap();
        f.engine
            .open_at(other.id, f.plan_id, t0() + Duration::days(1))
            .unwrap();

        let results = f.engine.accrue_due(t0() + Duration::days(2)).unwrap();
        assert_eq!(results.len(), 2);
        let mine = results.iter().find(|r| r.account_id == f.account_id).unwrap();
        let theirs = results.iter().find(|r| r.account_id == other.id).unwrap();
        assert_eq!(mine.days, 2);
        assert_eq!(theirs.days, 1);
    }
}

