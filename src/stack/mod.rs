//! Stack management module
//!
//! This module implements the stacked-branch core:
//! - Branch relationship records and their persistent store
//! - The branch forest derived from those records
//! - Branch creation and navigation within a stack
//! - Stack synchronization with resumable conflict handling

pub mod branch;
pub mod creator;
pub mod manager;
pub mod navigation;
pub mod store;
pub mod sync;
pub mod sync_state;
pub mod tree;

pub use branch::BranchRecord;
pub use manager::StackManager;
pub use store::RelationshipStore;
pub use sync::{SyncEngine, SyncObserver, SyncOptions, SyncOutcome, SyncReport, SyncStatus};
pub use sync_state::PendingSync;
pub use tree::TreeNode;
