//! Email service for verification codes, password resets and receipts.
//!
//! Uses SMTP via lettre for delivery with Askama templates. Without SMTP
//! configuration, messages are rendered and logged instead of sent.

use askama::Template;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use shopfront_core::order::Order;

use crate::config::EmailConfig;

#[derive(Template)]
#[template(path = "email/verification_code.html")]
struct VerificationCodeEmailHtml<'a> {
    code: &'a str,
    minutes: i64,
}

#[derive(Template)]
#[template(path = "email/verification_code.txt")]
struct VerificationCodeEmailText<'a> {
    code: &'a str,
    minutes: i64,
}

#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetEmailHtml<'a> {
    name: &'a str,
    reset_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetEmailText<'a> {
    name: &'a str,
    reset_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.html")]
struct OrderConfirmationEmailHtml<'a> {
    order: &'a Order,
    receipt_url: &'a str,
}

#[derive(Template)]
#[template(path = "email/order_confirmation.txt")]
struct OrderConfirmationEmailText<'a> {
    order: &'a Order,
    receipt_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum EmailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

#[derive(Clone)]
enum Delivery {
    Smtp {
        mailer: AsyncSmtpTransport<Tokio1Executor>,
        from_address: String,
    },
    Log,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    delivery: Delivery,
}

impl EmailService {
    /// Create an email service that sends through SMTP.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            delivery: Delivery::Smtp {
                mailer,
                from_address: config.from_address.clone(),
            },
        })
    }

    /// Create an email service that only logs messages.
    #[must_use]
    pub const fn log_only() -> Self {
        Self {
            delivery: Delivery::Log,
        }
    }

    /// Send a checkout verification code.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        minutes: i64,
    ) -> Result<(), EmailError> {
        let html = VerificationCodeEmailHtml { code, minutes }.render()?;
        let text = VerificationCodeEmailText { code, minutes }.render()?;

        self.send_multipart_email(to, "Your Shopfront verification code", &text, &html)
            .await
    }

    /// Send a password reset link.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_password_reset(
        &self,
        to: &str,
        name: &str,
        reset_url: &str,
    ) -> Result<(), EmailError> {
        let html = PasswordResetEmailHtml { name, reset_url }.render()?;
        let text = PasswordResetEmailText { name, reset_url }.render()?;

        self.send_multipart_email(to, "Reset your Shopfront password", &text, &html)
            .await
    }

    /// Send an order confirmation with a link to the receipt.
    ///
    /// # Errors
    ///
    /// Returns error if email fails to send or template fails to render.
    pub async fn send_order_confirmation(
        &self,
        order: &Order,
        receipt_url: &str,
    ) -> Result<(), EmailError> {
        let html = OrderConfirmationEmailHtml { order, receipt_url }.render()?;
        let text = OrderConfirmationEmailText { order, receipt_url }.render()?;
        let subject = format!("Order {} confirmed", order.order_number);

        self.send_multipart_email(order.customer_email.as_str(), &subject, &text, &html)
            .await
    }

    /// Send a multipart email with both plain text and HTML versions.
    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), EmailError> {
        let (mailer, from_address) = match &self.delivery {
            Delivery::Smtp {
                mailer,
                from_address,
            } => (mailer, from_address),
            Delivery::Log => {
                tracing::info!(to = %to, subject = %subject, body = %text_body, "SMTP not configured, email logged");
                return Ok(());
            }
        };

        let email = Message::builder()
            .from(
                from_address
                    .parse()
                    .map_err(|_| EmailError::InvalidAddress(from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| EmailError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        mailer.send(email).await?;

        tracing::info!(to = %to, subject = %subject, "Email sent successfully");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_code_templates_include_code() {
        let html = VerificationCodeEmailHtml {
            code: "482913",
            minutes: 10,
        }
        .render()
        .unwrap();
        let text = VerificationCodeEmailText {
            code: "482913",
            minutes: 10,
        }
        .render()
        .unwrap();
        assert!(html.contains("482913"));
        assert!(text.contains("482913"));
        assert!(text.contains("10 minutes"));
    }

    #[test]
    fn test_password_reset_template_escapes_name() {
        let html = PasswordResetEmailHtml {
            name: "<b>Eve</b>",
            reset_url: "https://shop.test/reset-password?token=abc",
        }
        .render()
        .unwrap();
        assert!(!html.contains("<b>Eve</b>"));
        assert!(html.contains("token=abc"));
    }

    #[tokio::test]
    async fn test_log_only_delivery_succeeds() {
        let service = EmailService::log_only();
        service
            .send_verification_code("guest@example.com", "123456", 10)
            .await
            .unwrap();
    }
}
