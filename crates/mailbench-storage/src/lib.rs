//! Mail storage: the in-memory document store and the direct-access gateway.

pub mod gateway;
pub mod memory;

pub use gateway::DirectStoreGateway;
pub use memory::MemoryMailStore;
