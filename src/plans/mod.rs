//! Investment plans: catalog, accrual engine, periodic scheduler

pub mod accrual;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use accrual::{AccrualEngine, AccrualResult};
pub use registry::PlanRegistry;
pub use scheduler::AccrualScheduler;
pub use types::{ActivePlanInstance, Plan};
