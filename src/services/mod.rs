/*!
 * Services Module
 *
 * Contains business logic and service layer implementations.
 */

pub mod broadcast_service;
pub mod contact_service;
pub mod dispatch_service;
pub mod email_service;
pub mod history_service;
pub mod in_app_service;
pub mod recipient_service;
pub mod rules_service;
pub mod scheduler_service;
pub mod template_service;

pub use broadcast_service::BroadcastService;
pub use contact_service::{ContactService, DEFAULT_CONTACT};
pub use dispatch_service::{DispatchService, CRITERIA_NOT_MET_DETAIL};
pub use email_service::EmailService;
pub use history_service::HistoryService;
pub use in_app_service::{InAppService, JUST_LOGGED_DETAIL};
pub use recipient_service::{merge_user_details, RecipientService};
pub use rules_service::{EligibilityFlags, PlannedNotification, RulesService, REMINDER_WEEKS};
pub use scheduler_service::SchedulerService;
pub use template_service::TemplateService;
