pub mod dispatcher;
pub mod domain;
pub mod fallback;
pub mod health;
pub mod planner;
pub mod ports;
pub mod scheduler;
pub mod selection;

#[cfg(test)]
pub(crate) mod test_support;

pub use domain::{
    Channel, DeliveryMode, DeliveryStatusRecord, JobStatus, OutboxJob, Subscriber,
    ValidationError, VocabularyWord, WordHistoryEntry, WordSource,
};
pub use ports::{
    DeliveryCounts, DeliveryStore, EmailService, GeneratedWord, PortError, PortResult,
    ProviderReceipt, SendError, WhatsAppService, WordGenerationService,
};
