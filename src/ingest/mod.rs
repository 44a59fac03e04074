/*!
 * Event Ingest Module
 *
 * Consumes domain events from the inbound queues and translates each
 * event kind into calls on the rules engine, the scheduler and the
 * in-app notifier. One handler per event family; each handler is a
 * thin pipeline (deserialise -> canonical model -> plan -> schedule)
 * and is safe under at-least-once redelivery.
 */

pub mod consumer;
pub mod forms;
pub mod gmc;
pub mod ltft;
pub mod placement;
pub mod programme;

use std::sync::Arc;

use crate::config::{Config, QueueConfig};
use crate::services::{
    ContactService, DispatchService, HistoryService, InAppService, RecipientService, RulesService,
    SchedulerService, TemplateService,
};

pub use consumer::spawn_consumers;

/// Services shared by every ingest handler
#[derive(Clone)]
pub struct IngestContext {
    pub rules: RulesService,
    pub scheduler: Arc<SchedulerService>,
    pub dispatch: Arc<DispatchService>,
    pub history: HistoryService,
    pub in_app: InAppService,
    pub recipient: RecipientService,
    pub contacts: ContactService,
    pub templates: TemplateService,
    pub queues: QueueConfig,
    /// Jitter window applied to day-of milestones
    pub day_of_jitter: std::time::Duration,
}

impl IngestContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        scheduler: Arc<SchedulerService>,
        dispatch: Arc<DispatchService>,
        history: HistoryService,
        in_app: InAppService,
        recipient: RecipientService,
        contacts: ContactService,
        templates: TemplateService,
    ) -> Self {
        Self {
            rules: RulesService::new(config.rules.clone()),
            scheduler,
            dispatch,
            history,
            in_app,
            recipient,
            contacts,
            templates,
            queues: config.queues.clone(),
            day_of_jitter: config.scheduling.day_of_jitter,
        }
    }
}
