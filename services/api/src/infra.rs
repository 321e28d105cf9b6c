use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use munaqasa::workflows::marketplace::{
    IdentityProvider, MarketplaceError, MarketplaceRepository, MarketplaceService, TokenRegistry,
    User,
};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Create an account for every identity the token table knows about.
///
/// Rows that already exist are left untouched, so admin changes to `active` and
/// `badge` survive restarts.
pub(crate) fn seed_identities<R, I>(
    service: &MarketplaceService<R, I>,
    registry: &TokenRegistry,
) -> Result<usize, MarketplaceError>
where
    R: MarketplaceRepository + 'static,
    I: IdentityProvider + 'static,
{
    let mut seeded = 0;
    for actor in registry.actors() {
        let user = service.ensure_user(User {
            id: actor.user_id,
            name: format!("{} {}", actor.role, actor.user_id),
            role: actor.role,
            active: true,
            badge: None,
        })?;
        debug!(user_id = user.id.0, role = %user.role, "identity account ready");
        seeded += 1;
    }
    Ok(seeded)
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
