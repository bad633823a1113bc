use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::SmtpConfig;
use crate::models::TrackedItem;
use crate::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    pub to: String,
    pub subject: String,
    pub text_body: String,
    pub html_body: String,
}

impl AlertMessage {
    /// Mail for an item whose observed price reached its target.
    pub fn price_drop(item: &TrackedItem, title: &str, price: Decimal, currency: &str) -> Self {
        let subject = format!("Price Drop Alert: {}", title);

        let mut text = String::new();
        text.push_str("Great news! A price drop was detected.\n\n");
        text.push_str(&format!("Product: {}\n", title));
        text.push_str(&format!("New Price: {}{}\n", currency, price));
        text.push_str(&format!("Your Target: {}{}\n\n", currency, item.desired_price));
        text.push_str(&format!("Buy now: {}\n", item.url));

        let html = format!(
            r#"<!DOCTYPE html>
<html>
<body style="font-family: Arial, sans-serif; margin: 20px;">
    <h2>Great News! Price Drop Detected</h2>
    <p><strong>Product:</strong> {title}</p>
    <p><strong>New Price:</strong> {currency}{price}</p>
    <p><strong>Your Target:</strong> {currency}{target}</p>
    <p><a href="{url}" style="background-color: #ff9900; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px;">Buy Now</a></p>
</body>
</html>
"#,
            title = escape_html(title),
            currency = escape_html(currency),
            price = price,
            target = item.desired_price,
            url = escape_html(&item.url),
        );

        Self {
            to: item.owner.email.clone(),
            subject,
            text_body: text,
            html_body: html,
        }
    }
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Outbound delivery of alert messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &AlertMessage) -> Result<()>;
}

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let raw_from = config.from_address.as_deref().ok_or_else(|| {
            AppError::Validation("notifications.smtp.from_address (or EMAIL_USER) is not set".to_string())
        })?;
        let address: Address = raw_from
            .parse()
            .map_err(|e| AppError::Validation(format!("Invalid from address {}: {}", raw_from, e)))?;
        let from = Mailbox::new(Some(config.from_name.clone()), address);

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| AppError::NotificationFailed(format!("Invalid SMTP relay {}: {}", config.host, e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        }
        .port(config.port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
        })
    }

    fn build_email(&self, message: &AlertMessage) -> Result<Message> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| AppError::NotificationFailed(format!("Invalid recipient {}: {}", message.to, e)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(message.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(message.html_body.clone()),
                    ),
            )
            .map_err(|e| AppError::NotificationFailed(e.to_string()))
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, message: &AlertMessage) -> Result<()> {
        let email = self.build_email(message)?;

        self.mailer
            .send(email)
            .await
            .map_err(|e| AppError::NotificationFailed(format!("SMTP delivery to {} failed: {}", message.to, e)))?;

        tracing::info!(to = %message.to, subject = %message.subject, "Alert email sent");
        Ok(())
    }
}
