use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use std::sync::Arc;
use tera::Context;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::dto::{ContactRequest, NewsletterRequest};
use crate::errors::AppError;
use crate::models::{Contact, Subscription};
use crate::notifier::Notifier;
use crate::store::{RecordStore, StoreError};

pub const CONTACT_ACK_TEMPLATE: &str = "emails/contact_acknowledgment_email.html";
pub const CONTACT_ALERT_TEMPLATE: &str = "emails/contact_notification_email.html";
pub const NEWSLETTER_TEMPLATE: &str = "emails/newsletter_welcome.txt";

pub const CONTACT_ACK_SUBJECT: &str = "Thank you for contacting store support!";
pub const NEWSLETTER_SUBJECT: &str = "Welcome to Our Newsletter!";

/// Contact form messages and newsletter sign-ups.
#[derive(Clone)]
pub struct Submissions {
    records: Arc<dyn RecordStore>,
    notifier: Notifier,
    admin_email: String,
}

impl Submissions {
    pub fn new(records: Arc<dyn RecordStore>, notifier: Notifier, admin_email: impl Into<String>) -> Self {
        Submissions {
            records,
            notifier,
            admin_email: admin_email.into(),
        }
    }

    #[instrument(name = "submissions::contact", skip_all)]
    pub async fn contact(&self, request: ContactRequest) -> Result<Contact, AppError> {
        request.validate()?;

        let contact = Contact {
            id: ObjectId::new(),
            name: request.name,
            email: request.email,
            subject: request.subject,
            message: request.message,
            created_at: Utc::now(),
        };
        self.records.insert_contact(&contact).await?;
        info!("Stored contact message {} from {}", contact.id, contact.email);

        let mut context = Context::new();
        context.insert("name", &contact.name);
        context.insert("email", &contact.email);
        context.insert("subject", &contact.subject);
        context.insert("message", &contact.message);

        if let Err(e) = self.notifier.send_templated(
            CONTACT_ACK_TEMPLATE,
            CONTACT_ACK_SUBJECT,
            &context,
            vec![contact.email.clone()],
        ) {
            warn!("Contact acknowledgment not queued: {}", e);
        }
        if let Err(e) = self.notifier.send_templated(
            CONTACT_ALERT_TEMPLATE,
            format!("New Contact Form Submission: {}", contact.subject),
            &context,
            vec![self.admin_email.clone()],
        ) {
            warn!("Contact alert not queued: {}", e);
        }

        Ok(contact)
    }

    #[instrument(name = "submissions::subscribe", skip_all)]
    pub async fn subscribe(&self, request: NewsletterRequest) -> Result<Subscription, AppError> {
        request.validate()?;

        let subscription = Subscription {
            id: ObjectId::new(),
            email: request.email,
            subscribed_at: Utc::now(),
        };
        match self.records.insert_subscription(&subscription).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Err(AppError::AlreadySubscribed),
            Err(e) => return Err(e.into()),
        }
        info!("New newsletter subscriber {}", subscription.email);

        if let Err(e) = self.notifier.send_templated(
            NEWSLETTER_TEMPLATE,
            NEWSLETTER_SUBJECT,
            &Context::new(),
            vec![subscription.email.clone()],
        ) {
            warn!("Newsletter welcome not queued: {}", e);
        }

        Ok(subscription)
    }
}
