//! # mpx SDK for Rust
//!
//! Client for the mpx media-management platform: sign in, read typed data
//! objects, page through queries and follow change notifications.
//!
//! ## Features
//!
//! - **Token lifecycle**: Tokens are cached per user and refreshed under a lock,
//!   in-process or shared through redis across processes
//! - **Automatic re-authentication**: A request rejected with 401 is retried
//!   once with a fresh token
//! - **Typed objects**: Load and select any `DeserializeOwned` type from a data service
//! - **Query builders**: Ranges, sorts, `byField` filters, field projections and `q` terms
//! - **Paging**: Forward iteration and streaming over every page of a query
//! - **Notifications**: Long-poll listener with expiry detection
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mpx_sdk::data::Media;
//! use mpx_sdk::query::{ByFields, Sort};
//! use mpx_sdk::{Client, Config, MEDIA_DATA_SERVICE};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("mpx/user@example.com", "secret");
//!     let client = Client::new(config).await?;
//!
//!     let media = client.factory::<Media>(MEDIA_DATA_SERVICE);
//!     let query = client
//!         .query()?
//!         .add(ByFields::new().field("title", "Most Excellent Video"))
//!         .with_sort(Sort::by_desc("added"));
//!
//!     let list = media.select(&query, None).await?;
//!     println!("Found {} media on the first page", list.entry_count());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod blocking;
pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod factory;
pub mod lock;
pub mod notify;
pub mod object_list;
pub mod query;
pub mod response;
pub mod service;
pub mod token;
pub mod token_cache;

// Re-export main types
pub use auth::{User, UserSession};
pub use client::{AuthenticatedClient, Client};
pub use config::Config;
pub use error::{ApiException, Error, Result};
pub use factory::{DataObject, DataObjectFactory};
pub use notify::{Notification, NotificationEntry, NotificationListener, NotificationMethod};
pub use object_list::{ObjectList, ObjectListIterator};
pub use service::{
    Account, DataService, DomainResolver, RegistryResolver, StaticResolver, ACCOUNT_DATA_SERVICE,
    MEDIA_DATA_SERVICE, PLAYER_DATA_SERVICE,
};
pub use token::Token;
pub use token_cache::TokenCachePool;
