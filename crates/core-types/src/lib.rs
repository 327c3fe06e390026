pub mod chat;
pub mod error;
pub mod market;
pub mod ticker;

// Re-export the core types to provide a clean public API.
pub use chat::{ChatCompletion, ChatMessage, MessageRole, UsageInfo};
pub use error::CoreError;
pub use market::{AssetMatch, AssetSearchResponse, Bar, MinutePrices, Timeframe};
pub use ticker::{NewTicker, TickerRecord};
