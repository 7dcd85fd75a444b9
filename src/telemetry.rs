//! Telemetry related to logins and credential renewals.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::Counter;

/// Total number of login attempts.
pub static LOGIN_COUNT: Lazy<Counter> = Lazy::new(|| {
    Counter::new("cf_auth_login_count", "Total number of login attempts")
        .expect("failed to initialise LOGIN_COUNT counter")
});

/// Number of login attempts that were denied.
pub static LOGIN_FAILED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "cf_auth_login_failed",
        "Number of login attempts that were denied",
    )
    .expect("failed to initialise LOGIN_FAILED counter")
});

/// Total number of credential renewal attempts.
pub static RENEW_COUNT: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "cf_auth_renew_count",
        "Total number of credential renewal attempts",
    )
    .expect("failed to initialise RENEW_COUNT counter")
});

/// Number of credential renewal attempts that were denied.
pub static RENEW_FAILED: Lazy<Counter> = Lazy::new(|| {
    Counter::new(
        "cf_auth_renew_failed",
        "Number of credential renewal attempts that were denied",
    )
    .expect("failed to initialise RENEW_FAILED counter")
});

/// Ensure metrics are registered only once.
static METRICS_REGISTERED: AtomicBool = AtomicBool::new(false);

/// The first time this method is called it will register the authentication metrics.
pub fn register_metrics(reg: &prometheus::Registry) -> Result<()> {
    // Skip registration if already done before.
    if METRICS_REGISTERED.swap(true, Ordering::AcqRel) {
        return Ok(());
    }

    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(LOGIN_COUNT.clone()),
        Box::new(LOGIN_FAILED.clone()),
        Box::new(RENEW_COUNT.clone()),
        Box::new(RENEW_FAILED.clone()),
    ];
    for collector in collectors {
        reg.register(collector)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::register_metrics;

    #[test]
    fn register_once() {
        let registry = prometheus::Registry::new();
        register_metrics(&registry).unwrap();
        register_metrics(&registry).unwrap();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "cf_auth_login_count",
                "cf_auth_login_failed",
                "cf_auth_renew_count",
                "cf_auth_renew_failed",
            ]
        );
    }
}
