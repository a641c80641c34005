use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::offers::{Application, Offer};

/// delivery failure reported by a notification collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),

    #[error("recipient rejected notification: {0}")]
    Rejected(String),

    #[error("notification timed out after {0:?}")]
    TimedOut(std::time::Duration),
}

/// tells an institution that one of its offers is about to expire
#[async_trait]
pub trait ExpirationNotifier: Send + Sync {
    async fn notify_institution_of_expiration(&self, offer: &Offer) -> Result<(), NotificationError>;
}

/// tells a borrower that an institution declined their application
pub trait BorrowerNotifier: Send + Sync {
    fn notify_application_declined(
        &self,
        application: &Application,
        reason: &str,
    ) -> Result<(), NotificationError>;
}

/// writes notifications to the log instead of delivering them
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ExpirationNotifier for LogNotifier {
    async fn notify_institution_of_expiration(&self, offer: &Offer) -> Result<(), NotificationError> {
        info!(
            offer_id = %offer.id,
            institution_id = %offer.institution_id,
            expires_at = %offer.expires_at,
            "offer expiring soon"
        );
        Ok(())
    }
}

impl BorrowerNotifier for LogNotifier {
    fn notify_application_declined(
        &self,
        application: &Application,
        reason: &str,
    ) -> Result<(), NotificationError> {
        info!(
            application_id = %application.id,
            borrower_id = %application.borrower_id,
            reason,
            "application declined"
        );
        Ok(())
    }
}
