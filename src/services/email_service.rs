/*!
 * Email Service
 *
 * The email transport boundary. Uses SMTP with TLS encryption.
 *
 * SECURITY CONSIDERATIONS:
 * - SMTP credentials are ONLY loaded from environment variables
 * - Credentials are NEVER stored in the database
 * - Credentials are NEVER logged (custom Debug impl prevents this)
 * - All connections use TLS/STARTTLS encryption
 *
 * A dispatch flagged `just_log` runs the whole pipeline up to this
 * boundary and is then dropped with an info log instead of a real send,
 * so templates can be inspected end-to-end without delivering.
 */

use anyhow::{Context, Result};
use lettre::{
    message::{MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info, warn};

use crate::config::EmailConfig;
use crate::utils::DispatchError;

/// Email transport
#[derive(Clone)]
pub struct EmailService {
    /// SMTP transport (None if email is disabled)
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    /// Sender email address
    from_email: String,
    /// Sender display name
    from_name: String,
    /// Whether email is enabled
    enabled: bool,
}

impl EmailService {
    /// Create a new email service from configuration
    ///
    /// # Arguments
    /// * `config` - Optional email configuration (None if email is disabled)
    ///
    /// # Returns
    /// An EmailService instance (may be disabled if config is None)
    pub fn new(config: Option<&EmailConfig>) -> Result<Self> {
        match config {
            Some(cfg) if cfg.enabled => {
                info!("Initializing email service with SMTP host: {}", cfg.smtp_host);

                let credentials = Credentials::new(
                    cfg.smtp_username.clone(),
                    cfg.smtp_password().to_string(),
                );

                let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
                    .context("Failed to create SMTP transport")?
                    .port(cfg.smtp_port)
                    .credentials(credentials)
                    .build();

                Ok(Self {
                    transport: Some(transport),
                    from_email: cfg.from_email.clone(),
                    from_name: cfg.from_name.clone(),
                    enabled: true,
                })
            }
            _ => {
                warn!("Email service is disabled - no SMTP configuration provided");
                Ok(Self {
                    transport: None,
                    from_email: String::new(),
                    from_name: String::new(),
                    enabled: false,
                })
            }
        }
    }

    /// Check if email service is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Send a rendered notification email.
    ///
    /// When `just_log` is set the recipient is still validated but the
    /// message is never handed to the transport; this is the
    /// suppress-but-log path.
    pub async fn send_notification(
        &self,
        to_email: &str,
        subject: &str,
        body_html: &str,
        just_log: bool,
    ) -> Result<(), DispatchError> {
        let to = to_email.parse().map_err(|e| {
            DispatchError::TransportPermanent(format!(
                "Invalid recipient address {}: {}",
                to_email, e
            ))
        })?;

        if just_log {
            info!("Suppressed email to {} ({})", to_email, subject);
            return Ok(());
        }

        let Some(transport) = self.transport.as_ref() else {
            info!(
                "Email transport disabled; not sending to {} ({})",
                to_email, subject
            );
            return Ok(());
        };

        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse()
            .map_err(|e| {
                DispatchError::Config(format!("Invalid from address {}: {}", self.from_email, e))
            })?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(MultiPart::alternative().singlepart(SinglePart::html(body_html.to_string())))
            .map_err(|e| {
                DispatchError::TransportPermanent(format!("Failed to build email message: {}", e))
            })?;

        match transport.send(message).await {
            Ok(_) => {
                info!("Email sent to {} ({})", to_email, subject);
                Ok(())
            }
            Err(e) => {
                error!("Failed to send email to {}: {:?}", to_email, e);
                if e.is_permanent() {
                    Err(DispatchError::TransportPermanent(e.to_string()))
                } else {
                    Err(DispatchError::TransportTransient(e.to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_email_service() {
        let service = EmailService::new(None).unwrap();
        assert!(!service.is_enabled());
    }

    #[tokio::test]
    async fn test_just_log_does_not_need_transport() {
        let service = EmailService::new(None).unwrap();
        let result = service
            .send_notification("trainee@example.com", "Subject", "<p>Body</p>", true)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_recipient_is_permanent_failure() {
        let service = EmailService::new(None).unwrap();
        let result = service
            .send_notification("not-an-address", "Subject", "<p>Body</p>", true)
            .await;
        assert!(matches!(
            result,
            Err(DispatchError::TransportPermanent(_))
        ));
    }
}
