//! Read-mostly plan catalog

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;

use super::types::Plan;
use crate::error::ServiceError;
use crate::storage::{keys, Storage};

pub struct PlanRegistry {
    plans: RwLock<BTreeMap<u64, Plan>>,
    next_id: AtomicU64,
    storage: Option<Arc<Storage>>,
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self {
            plans: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            storage: None,
        }
    }

    pub fn with_storage(storage: Arc<Storage>) -> Result<Self, ServiceError> {
        let rows: Vec<Plan> = storage.scan_prefix("plan:").map_err(ServiceError::Storage)?;
        let mut plans = BTreeMap::new();
        let mut max_id = 0;
        for plan in rows {
            max_id = max_id.max(plan.id);
            plans.insert(plan.id, plan);
        }
        Ok(Self {
            plans: RwLock::new(plans),
            next_id: AtomicU64::new(max_id + 1),
            storage: Some(storage),
        })
    }

    pub fn insert(
        &self,
        name: &str,
        stake: Decimal,
        daily_roi: Decimal,
        duration_days: i64,
    ) -> Result<Plan, ServiceError> {
        let plan = Plan {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            stake,
            daily_roi,
            duration_days,
        };
        if let Some(storage) = &self.storage {
            storage
                .put(&keys::plan(plan.id), &plan)
                .map_err(ServiceError::Storage)?;
        }
        self.plans
            .write()
            .map_err(|_| ServiceError::Busy)?
            .insert(plan.id, plan.clone());
        Ok(plan)
    }

    pub fn get(&self, id: u64) -> Result<Plan, ServiceError> {
        self.plans
            .read()
            .ok()
            .and_then(|m| m.get(&id).cloned())
            .ok_or_else(|| ServiceError::not_found("plan"))
    }

    /// Catalog in id order
    pub fn list(&self) -> Vec<Plan> {
        self.plans
            .read()
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.read().map(|m| m.is_empty()).unwrap_or(true)
    }
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_lookup() {
        let registry = PlanRegistry::new();
        assert!(registry.is_empty());

        let basic = registry
            .insert("Basic", Decimal::from(50), Decimal::from(20), 30)
            .unwrap();
        let gold = registry
            .insert("Gold", Decimal::from(100), Decimal::from(35), 30)
            .unwrap();
        assert_ne!(basic.id, gold.id);

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "Basic");

        assert_eq!(registry.get(gold.id).unwrap().name, "Gold");
        assert!(matches!(
            registry.get(999).unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}
