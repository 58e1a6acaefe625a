use std::sync::Arc;

use log::info;

use crate::configuration::Config;
use crate::container_pool::ContainerPool;
use crate::error_handling::types::ControllerError;
use crate::join::JoinCoordinator;
use crate::reporting::Reporter;
use crate::runtime::{ContainerRuntime, DockerRuntime};
use crate::scoring::ScoreEngine;
use crate::session_management::SessionManager;
use crate::storage::Database;
use crate::web_interface::WebServer;

/// Builds every subsystem from the configuration and serves the API.
pub struct Controller {
    config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn run(&self) -> Result<(), ControllerError> {
        let config = &self.config;

        info!("opening database at {}", config.database_path.display());
        let db = Database::open(&config.database_path).await?;

        let runtime: Arc<dyn ContainerRuntime> =
            Arc::new(DockerRuntime::new(config.runtime.clone()));
        let pool = Arc::new(ContainerPool::new(
            db.clone(),
            Arc::clone(&runtime),
            config.session.clone(),
        ));
        let manager = Arc::new(SessionManager::new(
            db.clone(),
            Arc::clone(&runtime),
            Arc::clone(&pool),
            config.clone(),
        ));
        let coordinator = Arc::new(JoinCoordinator::new(db.clone(), Arc::clone(&pool)));
        let scoring = Arc::new(ScoreEngine::new(db.clone(), config.scoring.clone()));
        let reporter = Arc::new(Reporter::new(db.clone()));

        let server = WebServer::new(
            db,
            manager,
            coordinator,
            scoring,
            reporter,
            runtime,
            config.web.bind_address.clone(),
            config.web.port,
        );
        server.start().await?;
        Ok(())
    }
}
