pub mod config;
pub mod datatypes;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod gsm;
pub mod health;
pub mod ingest;
pub mod report;
pub mod session;
pub mod store;


// Re-export the lifecycle API for easy access
pub use gateway::{Gateway, GatewayBuilder};

pub use config::{ConfigError, GatewayConfig, ReportDialect, load_config_from_path, load_config_from_str};
pub use error::{GatewayError, GatewayResult};

// Re-export the collaborator contracts and their bundled implementations
pub use session::{LoopbackSession, SessionEvent, SmppError, SmppResult, SmscSession, SubmitOutcome, SubmitUnit};
pub use store::{QueueStore, SqliteQueueStore, StoreError, StoreOptions, StorePaths};

pub use dispatch::{DrainSummary, Dispatcher};
pub use ingest::{FailureSink, Transliterator};
