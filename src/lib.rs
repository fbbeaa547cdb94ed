//! # Papyrus Driver
//!
//! A Rust client runtime for the [Papyrus](https://github.com/papyrusdb/papyrus)
//! document database.
//!
//! ## Features
//!
//! - **Resumable Cursors** - Client-side iteration over server-held result sets
//!   with resume-token tracking and guaranteed server-side cleanup
//! - **Async/Await** - Built on Tokio for high-performance async operations
//! - **Connection Pooling** - Per-server pools kept at their configured minimum
//!   by a background populator
//! - **Read Preferences** - Primary/secondary/nearest server selection with tag
//!   sets and a latency window
//!
//! ## Quick Start
//!
//! Add to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! papyrus-driver = "0.3"
//! tokio = { version = "1", features = ["full"] }
//! ```
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use papyrus_driver::{AuthToken, DriverConfig, ReadPreference};
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DriverConfig::builder(
//!     "papyrus://db1:5280,db2:5280",
//!     AuthToken::basic("app", "password"),
//! )?
//! .with_min_pool_size(2)
//! .with_read_preference(ReadPreference::nearest())
//! .with_server_selection_timeout(Duration::from_secs(10))
//! .build();
//! # Ok(())
//! # }
//! ```
//!
//! The driver is a library layer: the wire protocol lives behind the
//! [`QueryTransport`] and [`ConnectionFactory`] seams, which higher-level
//! query APIs plug in.
//!
//! ## Cursor Iteration
//!
//! A [`Cursor`] is created from the initial query result and pulls further
//! batches from its pinned server:
//!
//! ```rust,ignore
//! let mut cursor = driver.open_cursor(address, namespace, initial, None, options)?;
//! while let Some(doc) = cursor.try_next().await? {
//!     println!("{:?}", doc);
//! }
//! ```
//!
//! Dropping a cursor before exhaustion schedules a server-side kill through
//! the [`CursorRegistry`]; the background [`CursorReaper`] delivers it.
//!
//! ## Read Preferences
//!
//! ```rust
//! use papyrus_driver::{ReadMode, ReadPreference};
//! use std::collections::HashMap;
//!
//! let mut tags = HashMap::new();
//! tags.insert("dc".to_string(), "seoul".to_string());
//!
//! let preference = ReadPreference::builder()
//!     .mode(ReadMode::SecondaryPreferred)
//!     .tag_set(tags)
//!     .build();
//! ```
//!
//! ## Error Handling
//!
//! All operations return [`DriverResult`] for consistent error handling:
//!
//! ```rust
//! use papyrus_driver::{DriverConfig, AuthToken, DriverError};
//!
//! match DriverConfig::new("papyrus://db1:notaport", AuthToken::none()) {
//!     Ok(_) => {}
//!     Err(DriverError::Configuration(msg)) => eprintln!("Bad URI: {}", msg),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ## Modules
//!
//! - [`driver`] - Cursor, pool, populator, and driver glue
//! - [`driver::topology`] - Server descriptions, read preferences, selection
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod driver;

// Re-exports for convenience
pub use driver::{
    AuthToken, BasicConnectionFactory, BatchResult, Connection, ConnectionFactory,
    ConnectionPool, Cursor, CursorOptions, CursorReaper, CursorRegistry, Document, Driver,
    DriverConfig, DriverConfigBuilder, DriverError, DriverMetrics, DriverResult, Namespace,
    PoolConfig, PoolConfigBuilder, PoolMetrics, PoolPopulator, QueryTransport, ReadMode,
    ReadPreference, ResumeToken, Server, ServerAddress, ServerRole, ServerSelector, ServerSet,
    Session,
};

/// Config alias for convenience
pub type Config = DriverConfig;
