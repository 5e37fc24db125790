use super::templates;
use crate::config::MailSettings;
use crate::error::DependencyError;
use sendgrid::{Destination, Mail, SGClient};
use tracing::{error, info, warn};

/// Outbound mail through SendGrid. Without an API key every message is
/// logged instead of sent.
#[derive(Clone)]
pub struct Mailer {
    client: Option<SGClient>,
    from: String,
}

impl Mailer {
    pub fn new(settings: &MailSettings) -> Self {
        let client = settings.sendgrid_api_key.clone().map(SGClient::new);
        if client.is_none() {
            warn!("SendGrid API key not set; outgoing mail will be logged only");
        }
        Self {
            client,
            from: settings.from.clone(),
        }
    }

    pub fn mock(from: impl Into<String>) -> Self {
        Self {
            client: None,
            from: from.into(),
        }
    }

    pub fn is_mock(&self) -> bool {
        self.client.is_none()
    }

    pub async fn send_email(
        &self,
        to: &str,
        recipient_name: &str,
        subject: &str,
        html: &str,
    ) -> Result<(), DependencyError> {
        let Some(client) = &self.client else {
            info!(to, subject, body_len = html.len(), "(mock) email not sent");
            crate::metrics::mail_sent();
            return Ok(());
        };

        // The sendgrid client is blocking; the send runs off the async workers
        // with owned copies of everything it borrows.
        let client = client.clone();
        let to_owned = to.to_string();
        let name = recipient_name.to_string();
        let subject = subject.to_string();
        let html = html.to_string();
        let from = self.from.clone();

        let sent = tokio::task::spawn_blocking(move || {
            let mail = Mail::new()
                .add_to(Destination {
                    address: &to_owned,
                    name: &name,
                })
                .add_from(&from)
                .add_subject(&subject)
                .add_html(&html);
            client.send(mail).map(|_| ()).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| format!("mail task failed: {e}"))
        .and_then(|result| result);

        match sent {
            Ok(()) => {
                info!(to, "email sent");
                crate::metrics::mail_sent();
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "sendgrid rejected email");
                crate::metrics::mail_failed();
                Err(DependencyError::Mail(e))
            }
        }
    }

    pub async fn send_login_code(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), DependencyError> {
        let html = templates::login_code_email(username, code);
        self.send_email(to, username, "Your Poultry Farm login code", &html)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_mailer_accepts_everything() {
        let mailer = Mailer::mock("farm@example.test");
        assert!(mailer.is_mock());
        mailer
            .send_login_code("keeper@example.test", "keeper", "4821")
            .await
            .unwrap();
    }
}
