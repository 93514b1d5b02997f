//! Fetching side of PotatoMesh: the HTTP feed source, refresh cycles, chat
//! and per-node hydration, and the snapshot poller.

pub mod api;
pub mod chat;
pub mod error;
pub mod generation;
pub mod hydrate;
pub mod poller;
pub mod refresh;
pub mod single_flight;
pub mod source;

pub use api::ApiClient;
pub use chat::{ChatEntry, ChatHydrator};
pub use error::{ClientError, Result};
pub use generation::{RequestGenerations, RequestToken};
pub use hydrate::NodeHydrator;
pub use poller::Poller;
pub use refresh::{MeshSnapshot, RefreshCycle};
pub use single_flight::{SharedResult, SingleFlight};
pub use source::{Feed, FeedQuery, FeedSource, MemorySource};
