pub mod cluster;
pub mod manager;
pub mod memory;
pub mod object;
pub mod storage;
pub mod transaction;
pub mod xml;

pub use cluster::ClusterType;
pub use manager::ClusterStorageManager;
pub use memory::MemoryOnlyClusterStorage;
pub use object::{
    Collection, CollectionMember, Event, Job, Lifecycle, LocalObject, Outcome, Property,
    Viewpoint,
};
pub use storage::{Capability, ClusterStorage, TransactionKey};
pub use transaction::{TransactionEntry, TransactionalStorage};
pub use xml::{XmlClusterStorage, XmlStorageConfig};
