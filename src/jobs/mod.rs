use crate::context::AppContext;
use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        tokio::spawn(Self::handle_cache_cleanup_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Drop expired handle bindings
    async fn handle_cache_cleanup_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.identity.handle_cache_cleanup_secs.max(1);
        let mut interval = interval(Duration::from_secs(period));

        loop {
            interval.tick().await;

            match scheduler.context.directory.cleanup_cache().await {
                Ok(count) => {
                    if count > 0 {
                        info!("Removed {} expired handle bindings", count);
                    }
                }
                Err(e) => error!("Failed to clean up handle cache: {}", e),
            }
        }
    }
}
