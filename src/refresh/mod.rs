//! Entity resource refresh: eligibility rules, persistence, resolution and
//! the coordinator tying them together.

mod coordinator;
mod error;
mod memory_repository;
mod models;
mod policy;
mod repository;
mod resolver;
mod schema;
mod sqlite_repository;

pub use coordinator::RefreshCoordinator;
pub use error::RefreshError;
pub use memory_repository::InMemoryEntityRepository;
pub use models::{Asset, RefreshableRecord};
pub use policy::{RefreshPolicy, RefreshState};
pub use repository::EntityRepository;
pub use resolver::{icon_url, AssetResolver, HttpIconResolver, ResolveError};
pub use sqlite_repository::SqliteEntityRepository;
