/*!
 * Configuration Module
 *
 * Handles application configuration loading from environment variables
 * and provides structured access to configuration values.
 */

use std::collections::HashMap;
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration (health + admin API)
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Redis configuration (inbound event queues)
    pub redis: RedisConfig,
    /// Email/SMTP configuration (optional - transport disabled when absent)
    pub email: Option<EmailConfig>,
    /// Downstream SPI endpoints
    pub spi: SpiConfig,
    /// Outbound broadcast topic
    pub broadcast: BroadcastConfig,
    /// Inbound queue names, one per domain-event kind
    pub queues: QueueConfig,
    /// Scheduler and worker-pool tuning
    pub scheduling: SchedulingConfig,
    /// Notification rules configuration
    pub rules: RulesConfig,
    /// Template directory and pinned versions
    pub templates: TemplateConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server host address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
    /// Environment (development, production)
    pub environment: String,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    /// Connection acquire timeout
    pub acquire_timeout: Duration,
    /// Idle connection timeout
    pub idle_timeout: Duration,
    /// Maximum connection lifetime
    pub max_lifetime: Duration,
}

/// Redis configuration for the inbound event queues
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Capacity of the bounded channel between consumers and workers
    pub channel_capacity: usize,
}

/// Email/SMTP configuration
/// SECURITY: These credentials are loaded from environment variables only.
/// They are NEVER stored in the database, logs, or any persistent storage.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server host (e.g., "smtp.gmail.com")
    pub smtp_host: String,
    /// SMTP server port (e.g., 587 for TLS)
    pub smtp_port: u16,
    /// SMTP username
    pub smtp_username: String,
    /// SMTP password or app-specific password
    /// SECURITY: This is sensitive - never log or store this value
    smtp_password: String,
    /// Sender email address
    pub from_email: String,
    /// Sender display name
    pub from_name: String,
    /// Whether email sending is enabled
    pub enabled: bool,
}

impl EmailConfig {
    /// Get the SMTP password securely
    /// This method exists to make password access explicit and auditable
    pub fn smtp_password(&self) -> &str {
        &self.smtp_password
    }
}

// Custom Debug implementation to prevent password leakage in logs
impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Base URLs and timeout for the request/response SPIs
#[derive(Debug, Clone)]
pub struct SpiConfig {
    /// Trainee profile store base URL
    pub profile_base_url: String,
    /// Authoritative identity store base URL
    pub identity_base_url: String,
    /// Messaging controller (eligibility) base URL
    pub messaging_base_url: String,
    /// Reference data (local office contacts) base URL
    pub reference_base_url: String,
    /// Timeout applied to every outbound SPI call
    pub timeout: Duration,
}

/// Outbound broadcast topic configuration
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Topic endpoint; publisher is a no-op when unset.
    /// A name ending in ".fifo" enables per-record message grouping.
    pub topic: Option<String>,
    /// Optional value for the single `event_type` message attribute
    pub event_attribute: Option<String>,
}

/// Inbound queue names, one per domain-event kind
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub programme: String,
    pub placement: String,
    pub gmc_update: String,
    pub gmc_rejected: String,
    pub ltft_updated: String,
    pub ltft_updated_tpd: String,
    pub coj_signed: String,
    pub form_deleted: String,
}

/// Scheduler and worker-pool tuning
#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Minimum delay before an immediate notification fires
    pub notification_delay: Duration,
    /// Cadence of the due-trigger scan
    pub poll_interval: Duration,
    /// Lease granted to a claimed trigger; must exceed worst-case job runtime
    pub lease_ttl: Duration,
    /// Maximum concurrently dispatching jobs
    pub worker_count: usize,
    /// Jitter window for day-of milestones, spread after local midnight
    pub day_of_jitter: Duration,
    /// Grace period for draining in-flight jobs at shutdown
    pub shutdown_grace: Duration,
}

/// Notification rules configuration
#[derive(Debug, Clone)]
pub struct RulesConfig {
    /// Timezone in which "today" and milestone days are evaluated
    pub timezone: Tz,
    /// Start-date moves beyond this many days count as a deferral
    pub deferral_more_than_days: i64,
    /// Period-of-grace window; CCT inside it schedules no POG notifications
    pub pog_cutoff_weeks: u32,
    /// The 12-month POG notification needs CCT at least this many months out
    pub pog_12_month_cutoff_months: u32,
    /// Trainee ids exempt from the just-log suppression checks
    pub whitelisted_trainees: Vec<String>,
    /// Roles marking test/dummy accounts; always suppress real delivery
    pub dummy_roles: Vec<String>,
    /// Curriculum sub-types a programme membership must include (case-insensitive)
    pub included_curriculum_subtypes: Vec<String>,
    /// Specialties that exclude a programme membership entirely (uppercase)
    pub excluded_specialties: Vec<String>,
}

/// Pinned template versions for one template name
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateVersions {
    /// Email template version
    pub email: Option<String>,
    /// In-app template version
    #[serde(rename = "inApp")]
    pub in_app: Option<String>,
}

/// Template directory and pinned versions
#[derive(Debug, Clone)]
pub struct TemplateConfig {
    /// Root directory containing `email/` and `in-app/` template trees
    pub directory: String,
    /// templateName -> pinned versions per message kind
    pub versions: HashMap<String, TemplateVersions>,
}

impl TemplateConfig {
    /// Pinned version for a template name and message kind, if configured
    pub fn version_for(&self, template_name: &str, email: bool) -> Option<&str> {
        let versions = self.versions.get(template_name)?;
        if email {
            versions.email.as_deref()
        } else {
            versions.in_app.as_deref()
        }
    }
}

/// Parse a comma-separated environment variable into a trimmed list
fn env_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing
    /// or contain invalid values.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            server: ServerConfig {
                host: std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .unwrap_or(8000),
                environment: std::env::var("ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string()),
            },

            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?,
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .unwrap_or(20),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
                acquire_timeout: Duration::from_secs(
                    std::env::var("DATABASE_CONNECT_TIMEOUT")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .unwrap_or(30),
                ),
                idle_timeout: Duration::from_secs(
                    std::env::var("DATABASE_IDLE_TIMEOUT")
                        .unwrap_or_else(|_| "600".to_string())
                        .parse()
                        .unwrap_or(600),
                ),
                max_lifetime: Duration::from_secs(
                    std::env::var("DATABASE_MAX_LIFETIME")
                        .unwrap_or_else(|_| "1800".to_string())
                        .parse()
                        .unwrap_or(1800),
                ),
            },

            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                channel_capacity: std::env::var("INGEST_CHANNEL_CAPACITY")
                    .unwrap_or_else(|_| "256".to_string())
                    .parse()
                    .unwrap_or(256),
            },

            email: Self::email_from_env(),

            spi: SpiConfig {
                profile_base_url: std::env::var("PROFILE_SERVICE_URL")
                    .unwrap_or_else(|_| "http://localhost:8203/trainee-profile".to_string()),
                identity_base_url: std::env::var("IDENTITY_SERVICE_URL")
                    .unwrap_or_else(|_| "http://localhost:8204/identity".to_string()),
                messaging_base_url: std::env::var("MESSAGING_CONTROLLER_URL")
                    .unwrap_or_else(|_| "http://localhost:8205/messaging".to_string()),
                reference_base_url: std::env::var("REFERENCE_SERVICE_URL")
                    .unwrap_or_else(|_| "http://localhost:8206/reference".to_string()),
                timeout: Duration::from_secs(
                    std::env::var("SPI_TIMEOUT_SECONDS")
                        .unwrap_or_else(|_| "10".to_string())
                        .parse()
                        .unwrap_or(10),
                ),
            },

            broadcast: BroadcastConfig {
                topic: std::env::var("BROADCAST_TOPIC").ok().filter(|s| !s.is_empty()),
                event_attribute: std::env::var("BROADCAST_EVENT_ATTRIBUTE")
                    .ok()
                    .filter(|s| !s.is_empty()),
            },

            queues: QueueConfig {
                programme: std::env::var("QUEUE_PROGRAMME")
                    .unwrap_or_else(|_| "tis-notify-programme-membership".to_string()),
                placement: std::env::var("QUEUE_PLACEMENT")
                    .unwrap_or_else(|_| "tis-notify-placement".to_string()),
                gmc_update: std::env::var("QUEUE_GMC_UPDATE")
                    .unwrap_or_else(|_| "tis-notify-gmc-update".to_string()),
                gmc_rejected: std::env::var("QUEUE_GMC_REJECTED")
                    .unwrap_or_else(|_| "tis-notify-gmc-rejected".to_string()),
                ltft_updated: std::env::var("QUEUE_LTFT_UPDATED")
                    .unwrap_or_else(|_| "tis-notify-ltft-updated".to_string()),
                ltft_updated_tpd: std::env::var("QUEUE_LTFT_UPDATED_TPD")
                    .unwrap_or_else(|_| "tis-notify-ltft-updated-tpd".to_string()),
                coj_signed: std::env::var("QUEUE_COJ_SIGNED")
                    .unwrap_or_else(|_| "tis-notify-coj-signed".to_string()),
                form_deleted: std::env::var("QUEUE_FORM_DELETED")
                    .unwrap_or_else(|_| "tis-notify-form-deleted".to_string()),
            },

            scheduling: SchedulingConfig {
                notification_delay: Duration::from_secs(
                    std::env::var("NOTIFICATION_DELAY_MINUTES")
                        .unwrap_or_else(|_| "60".to_string())
                        .parse()
                        .unwrap_or(60u64)
                        * 60,
                ),
                poll_interval: Duration::from_secs(
                    std::env::var("SCHEDULER_POLL_INTERVAL_SECONDS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .unwrap_or(30),
                ),
                lease_ttl: Duration::from_secs(
                    std::env::var("SCHEDULER_LEASE_TTL_SECONDS")
                        .unwrap_or_else(|_| "600".to_string())
                        .parse()
                        .unwrap_or(600),
                ),
                worker_count: std::env::var("DISPATCH_WORKER_COUNT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(|| {
                        std::thread::available_parallelism()
                            .map(|p| p.get() * 4)
                            .unwrap_or(16)
                    }),
                day_of_jitter: Duration::from_secs(
                    std::env::var("DAY_OF_JITTER_HOURS")
                        .unwrap_or_else(|_| "9".to_string())
                        .parse()
                        .unwrap_or(9u64)
                        * 3600,
                ),
                shutdown_grace: Duration::from_secs(
                    std::env::var("SHUTDOWN_GRACE_SECONDS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()
                        .unwrap_or(30),
                ),
            },

            rules: RulesConfig {
                timezone: std::env::var("TIMEZONE")
                    .unwrap_or_else(|_| "Europe/London".to_string())
                    .parse()
                    .map_err(|e| anyhow::anyhow!("Invalid TIMEZONE: {}", e))?,
                deferral_more_than_days: std::env::var("DEFERRAL_MORE_THAN_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .unwrap_or(7),
                pog_cutoff_weeks: std::env::var("POG_CUTOFF_WEEKS")
                    .unwrap_or_else(|_| "12".to_string())
                    .parse()
                    .unwrap_or(12),
                pog_12_month_cutoff_months: std::env::var("POG_12_MONTH_CUTOFF_MONTHS")
                    .unwrap_or_else(|_| "6".to_string())
                    .parse()
                    .unwrap_or(6),
                whitelisted_trainees: env_list("WHITELISTED_TRAINEES"),
                dummy_roles: env_list("DUMMY_ROLES"),
                included_curriculum_subtypes: {
                    let list = env_list("INCLUDED_CURRICULUM_SUBTYPES");
                    if list.is_empty() {
                        vec!["MEDICAL_CURRICULUM".to_string()]
                    } else {
                        list
                    }
                },
                excluded_specialties: {
                    let list = env_list("EXCLUDED_SPECIALTIES");
                    if list.is_empty() {
                        vec![
                            "PUBLIC HEALTH MEDICINE".to_string(),
                            "FOUNDATION".to_string(),
                        ]
                    } else {
                        list
                    }
                },
            },

            templates: TemplateConfig {
                directory: std::env::var("TEMPLATE_DIRECTORY")
                    .unwrap_or_else(|_| "templates".to_string()),
                versions: Self::template_versions_from_env()?,
            },
        };

        Ok(config)
    }

    /// Load SMTP configuration; returns None when SMTP_HOST is absent
    fn email_from_env() -> Option<EmailConfig> {
        let smtp_host = std::env::var("SMTP_HOST").ok().filter(|s| !s.is_empty())?;

        Some(EmailConfig {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            smtp_username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: std::env::var("EMAIL_FROM_ADDRESS")
                .unwrap_or_else(|_| "no-reply@tis.nhs.uk".to_string()),
            from_name: std::env::var("EMAIL_FROM_NAME")
                .unwrap_or_else(|_| "TIS Trainee Notifications".to_string()),
            enabled: std::env::var("EMAIL_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }

    /// Parse TEMPLATE_VERSIONS (JSON map of templateName -> {email, inApp}),
    /// falling back to v1.0.0 for every known template name.
    fn template_versions_from_env() -> anyhow::Result<HashMap<String, TemplateVersions>> {
        if let Ok(raw) = std::env::var("TEMPLATE_VERSIONS") {
            if !raw.trim().is_empty() {
                let parsed: HashMap<String, TemplateVersions> = serde_json::from_str(&raw)
                    .map_err(|e| anyhow::anyhow!("Invalid TEMPLATE_VERSIONS JSON: {}", e))?;
                return Ok(parsed);
            }
        }

        Ok(crate::models::NotificationType::all()
            .iter()
            .map(|notification_type| {
                let versions = if notification_type.is_email() {
                    TemplateVersions {
                        email: Some("v1.0.0".to_string()),
                        in_app: None,
                    }
                } else {
                    TemplateVersions {
                        email: None,
                        in_app: Some("v1.0.0".to_string()),
                    }
                };
                (notification_type.template_name().to_string(), versions)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_config_debug_redacts_password() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            smtp_username: "user".to_string(),
            smtp_password: "super-secret".to_string(),
            from_email: "from@example.com".to_string(),
            from_name: "Sender".to_string(),
            enabled: true,
        };

        let debug_str = format!("{:?}", config);
        assert!(!debug_str.contains("super-secret"));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_template_config_version_lookup() {
        let mut versions = HashMap::new();
        versions.insert(
            "programme-created".to_string(),
            TemplateVersions {
                email: Some("v1.2.3".to_string()),
                in_app: None,
            },
        );
        let config = TemplateConfig {
            directory: "templates".to_string(),
            versions,
        };

        assert_eq!(config.version_for("programme-created", true), Some("v1.2.3"));
        assert_eq!(config.version_for("programme-created", false), None);
        assert_eq!(config.version_for("unknown", true), None);
    }

    #[test]
    fn test_env_list_splits_and_trims() {
        std::env::set_var("TEST_ENV_LIST_KEY", "a, b ,,c");
        assert_eq!(env_list("TEST_ENV_LIST_KEY"), vec!["a", "b", "c"]);
        std::env::remove_var("TEST_ENV_LIST_KEY");
    }
}
