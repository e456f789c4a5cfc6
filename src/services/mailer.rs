//! Outbound email
//!
//! Mail is always a side effect: callers hand a message to [`dispatch`],
//! which sends it on a background task and only logs failures.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{info, warn};

use crate::config::{MailConfig, SmtpConfig};
use crate::models::Department;

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub body: String,
}

impl OutboundEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: vec![to.into()],
            cc: Vec::new(),
            reply_to: None,
            subject: subject.into(),
            body: body.into(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutboundEmail) -> Result<()>;
}

/// SMTP delivery; implicit TLS on port 465, STARTTLS otherwise
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let sender = config
            .sender()
            .context("SMTP sender address missing (set smtp.from or smtp.username)")?;
        let from: Mailbox = sender
            .parse()
            .with_context(|| format!("Invalid SMTP sender address: {}", sender))?;

        let relay = if config.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        };
        let builder = relay
            .with_context(|| format!("Invalid SMTP host: {}", config.host))?
            .port(config.port);

        let builder = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => builder.credentials(Credentials::new(user.clone(), pass.clone())),
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN);

        for to in &email.to {
            builder = builder.to(to.parse().with_context(|| format!("Invalid recipient: {}", to))?);
        }
        for cc in &email.cc {
            builder = builder.cc(cc.parse().with_context(|| format!("Invalid CC address: {}", cc))?);
        }
        if let Some(ref reply_to) = email.reply_to {
            builder = builder.reply_to(
                reply_to
                    .parse()
                    .with_context(|| format!("Invalid reply-to address: {}", reply_to))?,
            );
        }

        let message = builder
            .body(email.body)
            .context("Failed to build email message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;

        Ok(())
    }
}

/// Used when sending is disabled: the message is logged and dropped
pub struct LogOnlyMailer;

#[async_trait]
impl Mailer for LogOnlyMailer {
    async fn send(&self, email: OutboundEmail) -> Result<()> {
        info!(
            to = ?email.to,
            cc = ?email.cc,
            subject = %email.subject,
            "Mail disabled, message not sent"
        );
        Ok(())
    }
}

pub fn build_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>> {
    match (config.enabled, &config.smtp) {
        (true, Some(smtp)) => {
            info!(host = %smtp.host, port = smtp.port, "SMTP mail delivery enabled");
            Ok(Arc::new(SmtpMailer::new(smtp)?))
        }
        _ => {
            info!("Mail delivery disabled, outgoing messages will only be logged");
            Ok(Arc::new(LogOnlyMailer))
        }
    }
}

/// Send on a background task; failures are logged at warn and never surface
pub fn dispatch(mailer: Arc<dyn Mailer>, email: OutboundEmail, purpose: &'static str) {
    tokio::spawn(async move {
        let subject = email.subject.clone();
        if let Err(e) = mailer.send(email).await {
            warn!(purpose, subject = %subject, error = %format!("{:#}", e), "Failed to send email");
        }
    });
}

/// Main inbox as recipient, the department's inbox on CC
///
/// Without a main inbox the department inbox becomes the recipient. `None`
/// when nobody is configured to receive the message.
pub fn quote_recipients(config: &MailConfig, department: Department) -> Option<(Vec<String>, Vec<String>)> {
    let departments = &config.departments;
    let department_inbox = match department {
        Department::Finance => departments.finance.clone(),
        Department::Admin => departments.admin.clone(),
        Department::Ops => departments.ops.clone(),
        Department::It => departments.it.clone(),
        Department::Business => departments.business.clone(),
    };

    match (config.main_inbox.clone(), department_inbox) {
        (Some(main), Some(cc)) if cc != main => Some((vec![main], vec![cc])),
        (Some(main), _) => Some((vec![main], Vec::new())),
        (None, Some(dept)) => Some((vec![dept], Vec::new())),
        (None, None) => None,
    }
}
