use async_trait::async_trait;
use tracing::info;

use crate::defs::DeliveryError;
use crate::defs::LocaleResolver;
use crate::defs::Notifier;
use crate::defs::SubscriberId;

/// Resolves every subscriber to the same locale.
pub struct FixedLocale {
    pub locale: String,
}

impl FixedLocale {
    pub fn new(locale: impl Into<String>) -> Self {
        Self { locale: locale.into() }
    }
}

#[async_trait]
impl LocaleResolver for FixedLocale {
    async fn resolve(&self, _subscriber_id: SubscriberId) -> String {
        self.locale.clone()
    }
}

/// Notifier that writes each message to the log instead of a chat transport.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, subscriber_id: SubscriberId, text: &str) -> Result<(), DeliveryError> {
        info!("deliver to {} ({} chars):\n{}", subscriber_id, text.chars().count(), text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixed_locale_ignores_subscriber() {
        let resolver = FixedLocale::new("fa");
        assert_eq!(resolver.resolve(1).await, "fa");
        assert_eq!(resolver.resolve(-1001).await, "fa");
    }

    #[tokio::test]
    async fn log_notifier_always_delivers() {
        assert!(LogNotifier.send(7, "<b>hello</b>").await.is_ok());
    }

    #[test]
    fn permanent_delivery_errors() {
        assert!(DeliveryError::Blocked.is_permanent());
        assert!(DeliveryError::NotFound.is_permanent());
        assert!(!DeliveryError::RateLimited { retry_after_secs: 3 }.is_permanent());
        assert!(!DeliveryError::Transport("reset".into()).is_permanent());
    }
}
