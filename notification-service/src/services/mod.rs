pub mod dispatcher;
pub mod idempotency;
pub mod metrics;
pub mod providers;
pub mod template;

pub use dispatcher::Dispatcher;
pub use idempotency::IdempotencyStore;
pub use metrics::{get_metrics, init_metrics};
pub use providers::{
    EmailMessage, EmailProvider, MailjetProvider, MessagingProvider, MockEmailProvider,
    MockMessagingProvider, ProviderError, ProviderResponse, WhatsAppMessage, WhatsAppProvider,
};
