//! SMTP driver.

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
};

use super::{Email, MailError, Mailer};
use crate::config::MailConfig;

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &MailConfig) -> Result<Self, MailError> {
        let host = config.host.clone();
        let mut builder = if config.use_tls {
            let tls_params = TlsParameters::new(host.clone())
                .map_err(|e| MailError::InvalidConfig(format!("TLS configuration error: {e}")))?;

            // Port 465 uses implicit TLS (SMTPS), other ports use STARTTLS
            if config.port == 465 {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
                    .map_err(|e| MailError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(config.port)
                    .tls(Tls::Wrapper(tls_params))
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host)
                    .map_err(|e| MailError::InvalidConfig(format!("SMTP relay error: {e}")))?
                    .port(config.port)
                    .tls(Tls::Required(tls_params))
            }
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host).port(config.port)
        };

        if let (Some(user), Some(pass)) = (config.username.clone(), config.password.clone()) {
            builder = builder.credentials(Credentials::new(user, pass));
        }

        let from = match &config.from_name {
            Some(name) => format!("{} <{}>", name, config.from_address),
            None => config.from_address.clone(),
        };
        let from = from
            .parse::<Mailbox>()
            .map_err(|e| MailError::InvalidConfig(format!("Invalid from address: {e}")))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

impl SmtpMailer {
    async fn send_one(&self, to: &str, email: &Email) -> Result<(), MailError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| MailError::SendFailed(format!("Invalid to address {to}: {e}")))?;
        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::SendFailed(format!("Failed to build email: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// Tries every recipient; a failure is logged and the rest still get the message.
async fn send_to_each<'a, F, Fut>(recipients: &'a [String], mut send: F) -> Result<(), MailError>
where
    F: FnMut(&'a str) -> Fut,
    Fut: Future<Output = Result<(), MailError>>,
{
    let mut failed = Vec::new();
    for to in recipients {
        if let Err(err) = send(to).await {
            tracing::warn!(recipient = %to, error = %err, "smtp delivery failed");
            failed.push(to.as_str());
        }
    }
    if failed.is_empty() {
        Ok(())
    } else {
        Err(MailError::SendFailed(format!(
            "{} of {} recipients failed: {}",
            failed.len(),
            recipients.len(),
            failed.join(", ")
        )))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<(), MailError> {
        // One message per recipient so addresses are not disclosed to each other.
        send_to_each(&email.to, |to| self.send_one(to, email)).await
    }
}
