// orgsync-core: Sync engine keeping local record snapshots consistent with the server

pub mod bus;
pub mod config;
pub mod error;
pub mod mutation;
pub mod relay;
pub mod report;
pub mod session;
pub mod store;

pub use bus::{ChangeAction, ChangeBus, ChangeNotice, ChangeSource, event_name, parse_event_name};
pub use config::{DEFAULT_NAMESPACE, SessionConfig, StorageBackend};
pub use error::CoreError;
pub use mutation::MutationCoordinator;
pub use relay::{
    BroadcastRelay, BroadcastSignal, FileStorage, MemoryContext, MemoryStorage, SharedStorage,
    StorageChange, channel_key,
};
pub use report::{DashboardSummary, organizations_csv};
pub use session::{Session, SessionParts};
pub use store::{
    EntitySnapshot, EntityStore, RefreshTarget, SnapshotSubscription, StoreStatus, Subscription,
};

// Re-export the wire types consumers need alongside the engine.
pub use orgsync_api::{
    Backoff, ConnectionState, EntityId, EntityKind, NewOrganization, NewStaff, Organization,
    OrganizationOption, OrganizationPatch, OrganizationRef, ReconnectConfig, Resource, Staff,
    StaffPatch, StaffRole, TlsMode, TransportConfig,
};
