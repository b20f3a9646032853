use cadence::application_impl::{FakeAuthGateway, SessionManager};
use cadence::application_port::SessionService;
use cadence::domain_port::{SessionChangeNotifier, TokenStore};
use cadence::infra::{FileSessionStore, LoginRouteNavigator, MemorySessionStore};
use cadence::logger::*;
use cadence::settings::*;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    info!(?project_settings);
    let logger_config = LogConfig {
        filter: project_settings.log.filter.clone(),
    };
    logger.reload_from_config(&logger_config)?;

    if project_settings.auth.backend != "fake" {
        return Err(anyhow::anyhow!(
            "unknown auth backend: {:?}",
            project_settings.auth.backend
        ));
    }
    let gateway = Arc::new(FakeAuthGateway::new());
    let navigator = Arc::new(LoginRouteNavigator::new(
        project_settings.session.login_route.clone(),
    ));

    let (store, notifier): (Arc<dyn TokenStore>, Arc<dyn SessionChangeNotifier>) =
        match project_settings.session.backend.as_str() {
            "file" => {
                let store =
                    Arc::new(FileSessionStore::open(&project_settings.session.storage_dir).await?);
                (store.clone(), store)
            }
            "memory" => {
                let store = Arc::new(MemorySessionStore::new());
                (store.clone(), store)
            }
            other => {
                return Err(anyhow::anyhow!("unknown session backend: {other:?}"));
            }
        };

    let manager = SessionManager::new(store, gateway.clone(), notifier, navigator);

    manager.init().await;
    if !manager.is_authenticated().await {
        info!("no stored session, performing demo login");
        let pair = gateway.issue_pair()?;
        manager.install_session(&pair, &gateway.profile()).await?;
    }

    if let Some(expires_at) = manager.token_expiration().await {
        info!(
            %expires_at,
            refresh_in = ?manager.armed_refresh_delay(),
            "session active"
        );
    }

    signal::ctrl_c().await?;
    info!("shutting down");
    manager.clear_session().await;

    Ok(())
}
