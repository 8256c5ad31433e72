pub mod aggregator;
pub mod extractor;
pub mod notification;
pub mod summarizer;

pub use aggregator::{Aggregator, FileAggregator};
pub use extractor::{SectionExtractor, TextSectionExtractor};
pub use notification::{
    DeliveryReceipt, FileTransport, NotificationMessage, NotificationTransport, WebhookTransport,
};
pub use summarizer::{LlmSummarizer, Summarizer};
