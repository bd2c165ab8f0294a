use crate::config::Config;
use crate::db::connection::{DbPool, pool_stats};
use crate::realtime::{AudiencePolicy, Broadcaster, ConnectionRegistry, EventRouter};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub events: EventRouter,
}

impl AppState {
    pub fn new(db: DbPool, config: Config) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let events = EventRouter::new(
            Broadcaster::new(registry),
            AudiencePolicy::from(&config.realtime),
        );

        AppState {
            db,
            config: Arc::new(config),
            events,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        self.events.broadcaster().registry()
    }
}

/// Periodically check out a pooled connection so failures surface in the logs.
pub fn spawn_pool_health_check(db: DbPool) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            match db.acquire().await {
                Ok(conn) => {
                    drop(conn);
                    debug!("{}", pool_stats(&db));
                }
                Err(e) => {
                    error!("Database connection health check failed: {}", e);
                }
            }
        }
    })
}
