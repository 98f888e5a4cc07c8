//! Templated email notifications.
//!
//! Rendering happens on the caller's task so template mistakes surface at the
//! call site. Delivery happens on a background worker that drains a queue in
//! order and retries each email a bounded number of times, so a slow or
//! failing mail server never holds up a request.

mod mailer;

pub use mailer::{ConsoleMailer, MailError, Mailer, MemoryMailer, OutgoingEmail, SmtpMailer};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tera::{Context, Tera};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to render template '{template}': {source}")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },

    #[error("notification queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub from_email: String,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

enum Job {
    Deliver(OutgoingEmail),
    Flush(oneshot::Sender<()>),
}

#[derive(Clone)]
pub struct Notifier {
    templates: Arc<Tera>,
    from_email: String,
    queue: mpsc::UnboundedSender<Job>,
}

/// Loads every template below `dir`, named by their path relative to it
/// (for example `emails/client_email_template.html`).
pub fn load_templates(dir: &Path) -> Result<Tera, tera::Error> {
    let pattern = format!("{}/**/*", dir.display());
    let tera = Tera::new(&pattern)?;
    info!(
        "Loaded {} email templates from {}",
        tera.get_template_names().count(),
        dir.display()
    );
    Ok(tera)
}

impl Notifier {
    /// Spawns the delivery worker. The worker stops once every `Notifier`
    /// clone has been dropped and the queue is empty.
    pub fn start(
        mailer: Arc<dyn Mailer>,
        templates: Tera,
        settings: NotifierSettings,
    ) -> (Notifier, JoinHandle<()>) {
        let (queue, jobs) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(jobs, mailer, settings.clone()));
        let notifier = Notifier {
            templates: Arc::new(templates),
            from_email: settings.from_email,
            queue,
        };
        (notifier, worker)
    }

    /// Renders `template_id` with `context` and queues it for `recipients`.
    ///
    /// Templates whose id ends in `.html` are sent as HTML, anything else as
    /// plain text.
    pub fn send_templated(
        &self,
        template_id: &str,
        subject: impl Into<String>,
        context: &Context,
        recipients: Vec<String>,
    ) -> Result<(), NotifyError> {
        let body = self
            .templates
            .render(template_id, context)
            .map_err(|source| NotifyError::Render {
                template: template_id.to_string(),
                source,
            })?;
        let email = OutgoingEmail {
            from: self.from_email.clone(),
            to: recipients,
            subject: subject.into(),
            body,
            html: template_id.ends_with(".html"),
        };
        debug!("Queueing email '{}' for {:?}", email.subject, email.to);
        self.queue
            .send(Job::Deliver(email))
            .map_err(|_| NotifyError::QueueClosed)
    }

    /// Waits until everything queued before this call has been handled.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.queue.send(Job::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn run_worker(
    mut jobs: mpsc::UnboundedReceiver<Job>,
    mailer: Arc<dyn Mailer>,
    settings: NotifierSettings,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            Job::Deliver(email) => deliver(mailer.as_ref(), &email, &settings).await,
            Job::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    info!("Notification worker stopped");
}

async fn deliver(mailer: &dyn Mailer, email: &OutgoingEmail, settings: &NotifierSettings) {
    let attempts = settings.max_attempts.max(1);
    for attempt in 1..=attempts {
        match mailer.send(email).await {
            Ok(()) => {
                info!("Sent '{}' to {:?}", email.subject, email.to);
                return;
            }
            Err(e) if attempt < attempts => {
                warn!(
                    "Attempt {}/{} to send '{}' failed: {}",
                    attempt, attempts, email.subject, e
                );
                tokio::time::sleep(settings.retry_backoff * attempt).await;
            }
            Err(e) => {
                error!(
                    "Giving up on '{}' to {:?} after {} attempts: {}",
                    email.subject, email.to, attempts, e
                );
            }
        }
    }
}
