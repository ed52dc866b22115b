//! Campus Domain - Core types of the sync core
//!
//! This crate defines the domain model shared by the application and
//! infrastructure layers. All types here are pure Rust with no I/O.

pub mod download;
pub mod error;
pub mod http;
pub mod id;
pub mod pagination;
pub mod query;
pub mod rate_limit;
pub mod role;
pub mod session;
pub mod settings;
pub mod validation;

pub use download::{Download, filename_from_content_disposition};
pub use error::{DomainError, DomainResult};
pub use http::{ApiRequest, ApiResponse, HttpMethod};
pub use id::generate_request_id;
pub use pagination::{Page, Pagination};
pub use query::{CacheKey, FilterSet, ResourceType, SortOrder, SortSpec};
pub use rate_limit::{LimiterState, RateLimitWindow};
pub use role::{Capability, Role};
pub use session::{Session, StoredCredential, Token, UserId};
pub use settings::{ApiSettings, CacheSettings, RateLimitSettings, StorageSettings, SyncSettings};
pub use validation::{FieldError, ValidationErrors};
