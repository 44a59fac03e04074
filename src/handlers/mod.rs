/*!
 * Handlers Module
 *
 * HTTP request handlers for the admin and health API.
 */

pub mod notifications;

use std::sync::Arc;

use crate::services::{DispatchService, HistoryService, SchedulerService, TemplateService};

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub history: HistoryService,
    pub scheduler: Arc<SchedulerService>,
    pub dispatch: Arc<DispatchService>,
    pub templates: TemplateService,
}
