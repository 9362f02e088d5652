//! Realtime registry plumbing: the remote store seam, the write gateway and
//! the snapshot subscription that keeps every client's view current.

pub mod gateway;
pub mod live;
pub mod memory;
pub mod position;
pub mod registry;
pub mod remote;

pub use gateway::{WriteError, WriteGateway, WriteOp};
pub use live::LiveView;
pub use memory::MemoryStore;
pub use position::{
    FixedPositionSource, Position, PositionError, PositionOptions, PositionSource, PositionWatch,
};
pub use registry::{
    ObserverId, Registration, RegistrySync, Snapshot, SubscriptionError, SyncEvent, SyncState,
};
pub use remote::{FeedEvent, FeedSender, Ordering, Query, RemoteStore, StoreError, Subscription};
