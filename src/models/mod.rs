/*!
 * Models Module
 *
 * Data models for the notification engine: notification types and
 * history records, domain-event snapshots, scheduled triggers, and
 * merged user details.
 */

pub mod contact;
pub mod events;
pub mod notification;
pub mod trigger;
pub mod user;

pub use contact::{ContactType, HrefType, LocalOfficeContact};
pub use events::{
    CojSignedEvent, Curriculum, FormDeletedEvent, GmcRejectedEvent, GmcUpdateEvent,
    LtftUpdateEvent, PlacementEvent, ProgrammeMembershipEvent,
};
pub use notification::{
    History, HistoryResponse, MessageKind, NotificationStatus, NotificationType, Recipient,
    Reference, ReferenceKind, TemplateBinding, UpdateStatusRequest,
};
pub use trigger::{ProcessLock, ScheduledTrigger, TriggerPayload};
pub use user::{IdentityAccount, TraineeProfile, UserDetails};
