//! File-based data lake: one JSON file per message, partitioned by capture
//! date and channel, plus one media file per message where supported.

pub mod cursor;
pub mod record;
pub mod writer;

pub use record::ScrapedMessage;
pub use writer::DataLake;
