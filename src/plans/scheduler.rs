//! Periodic accrual task

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use super::accrual::AccrualEngine;
use crate::account::VerificationTokens;

/// Drives the accrual sweep on a fixed tick and opportunistically purges
/// expired verification tokens. Re-entrancy is safe: the engine's
/// per-instance locks serialize overlapping sweeps.
pub struct AccrualScheduler {
    engine: Arc<AccrualEngine>,
    tokens: Arc<VerificationTokens>,
    tick: Duration,
}

impl AccrualScheduler {
    pub fn new(engine: Arc<AccrualEngine>, tokens: Arc<VerificationTokens>, tick_secs: u64) -> Self {
        Self {
            engine,
            tokens,
            tick: Duration::from_secs(tick_secs),
        }
    }

    pub async fn start(self) {
        info!("Accrual scheduler started (tick {:?})", self.tick);

        loop {
            tokio::time::sleep(self.tick).await;

            let now = Utc::now();
            match self.engine.accrue_due(now) {
                Ok(results) => {
                    let credited: usize = results.iter().filter(|r| r.days > 0).count();
                    if credited > 0 {
                        info!("Accrual sweep credited {} instance(s)", credited);
                    }
                    for result in &results {
                        if result.completed {
                            info!(
                                "Plan instance {} matured (account {})",
                                result.instance_id, result.account_id
                            );
                        }
                    }
                }
                Err(e) => error!("Accrual sweep failed: {}", e),
            }

            match self.tokens.purge_expired(now) {
                Ok(0) => {}
                Ok(n) => info!("Purged {} expired verification token(s)", n),
                Err(e) => error!("Token purge failed: {}", e),
            }
        }
    }
}
