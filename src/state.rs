use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{activity::ActivityLogger, storage::StorageService, trips::TripService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DbPool,
    pub storage: StorageService,
    pub activity: ActivityLogger,
    pub trips: TripService,
}

impl AppState {
    /// Builds the state and starts the activity worker; must run inside a
    /// tokio runtime.
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let storage = StorageService::new(db.clone());
        let (activity, _worker) = ActivityLogger::spawn(Arc::new(storage.clone()), &config.activity);
        let trips = TripService::new(storage.clone(), activity.clone());
        Self {
            config,
            db,
            storage,
            activity,
            trips,
        }
    }
}
