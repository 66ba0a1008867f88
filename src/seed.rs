//! First-boot provisioning: plan catalog and starter accounts

use rust_decimal::Decimal;
use tracing::info;

use crate::account::AccountStore;
use crate::config::AuthConfig;
use crate::error::ServiceError;
use crate::plans::PlanRegistry;

pub const ADMIN_EMAIL: &str = "admin@profitbliss.com";
pub const DEMO_EMAIL: &str = "user@profitbliss.com";

pub fn seed(
    registry: &PlanRegistry,
    accounts: &AccountStore,
    auth: &AuthConfig,
) -> Result<(), ServiceError> {
    if registry.is_empty() {
        registry.insert("Basic", Decimal::from(50), Decimal::from(20), 30)?;
        registry.insert("Gold", Decimal::from(100), Decimal::from(35), 30)?;
        registry.insert("Master", Decimal::from(200), Decimal::from(50), 30)?;
        registry.insert("Premium", Decimal::from(300), Decimal::from(75), 30)?;
        info!("Seeded plan catalog");
    }

    if accounts.get_by_email(ADMIN_EMAIL).is_none() {
        accounts.create_provisioned(
            ADMIN_EMAIL,
            &auth.admin_password,
            true,
            true,
            Decimal::ZERO,
        )?;
        info!("Seeded {}", ADMIN_EMAIL);
    }

    if accounts.get_by_email(DEMO_EMAIL).is_none() {
        accounts.create_provisioned(
            DEMO_EMAIL,
            &auth.demo_password,
            true,
            false,
            Decimal::from(500),
        )?;
        info!("Seeded {} (balance $500)", DEMO_EMAIL);
    }

    Ok(())
}
