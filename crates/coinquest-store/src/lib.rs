//! Account-store collaborator: the trait the engine talks to, an in-memory
//! implementation for tests and offline runs, and the HTTP client that talks
//! to the remote platform API.

pub mod account;
pub mod error;
pub mod memory;
pub mod remote;

pub use account::{apply_patch, AccountStore};
pub use error::{Result, StoreError};
pub use memory::MemoryAccountStore;
pub use remote::HttpAccountStore;
