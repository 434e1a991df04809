//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod identity;
mod remark;
mod store;

pub use identity::IdentityProvider;
pub use remark::{GeneratedRemark, RemarkGenerator};
pub use store::{AttendanceStore, FeedState, Subscription, WriteBatch, WriteOp};
