//! Two session managers over one shared store, standing in for two open
//! tabs: tab B refreshes, tab A observes the change and re-arms.

use cadence::application_impl::{FakeAuthGateway, SessionManager};
use cadence::application_port::SessionService;
use cadence::infra::{LoginRouteNavigator, MemorySessionStore};
use cadence::logger::*;
use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = Logger::new_bootstrap();
    logger.reload_from_config(&LogConfig {
        filter: "debug".to_string(),
    })?;

    // Short-lived tokens so the fallback schedule is visible.
    let gateway = Arc::new(FakeAuthGateway::new().with_access_ttl(ChronoDuration::hours(2)));
    let navigator = Arc::new(LoginRouteNavigator::new("/login"));

    let store_a = MemorySessionStore::new();
    let store_b = store_a.another_tab();

    let tab_a = SessionManager::new(
        Arc::new(store_a.clone()),
        gateway.clone(),
        Arc::new(store_a.clone()),
        navigator.clone(),
    );
    let tab_b = SessionManager::new(
        Arc::new(store_b.clone()),
        gateway.clone(),
        Arc::new(store_b.clone()),
        navigator,
    );

    info!("tab A logs in");
    let pair = gateway.issue_pair()?;
    tab_a.install_session(&pair, &gateway.profile()).await?;

    info!("tab B starts up against the shared store");
    tab_b.init().await;
    info!(
        tab_a = ?tab_a.armed_refresh_delay(),
        tab_b = ?tab_b.armed_refresh_delay(),
        "both tabs scheduled"
    );

    info!("tab B refreshes; tab A should re-arm from the new token");
    tab_b.refresh().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!(
        tab_a = ?tab_a.armed_refresh_delay(),
        tab_b = ?tab_b.armed_refresh_delay(),
        refresh_calls = gateway.refresh_calls(),
        "after refresh"
    );

    info!("tab B logs out; tab A should observe the cleared session");
    tab_b.logout().await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!(
        tab_a_authenticated = tab_a.is_authenticated().await,
        tab_a_armed = tab_a.armed_refresh_delay().is_some(),
        "after logout"
    );

    Ok(())
}
