//! Client SDK for multi-service cloud platforms built on the OpenStack-style
//! identity/catalog model: object storage, CDN, compute and user management.
//!
//! Authenticate once per [`Account`], then resolve regional service
//! endpoints from the provider's catalog and work through the typed facades:
//!
//! ```no_run
//! use stratus_sdk::Account;
//!
//! # async fn demo() -> Result<(), stratus_sdk::Error> {
//! let account = Account::builder()
//!     .username("fred")
//!     .api_key("secret")
//!     .build();
//!
//! let containers = account.containers("ORD").await?;
//! let container = containers.get("assets")?;
//! container.upload("hello.txt", "hello world".to_owned(), Default::default()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! Token refresh on 401, bounded retry on transport timeouts and segmented
//! large-object uploads all happen inside the request pipeline; callers only
//! see typed results and [`Error`] values.

pub mod cache;
pub mod error;
pub mod http_client;
pub mod identity;
pub mod servers;
pub mod storage;
pub mod users;

pub(crate) mod utils;

pub use error::Error;
pub use identity::Account;
pub use utils::url_encode;
