// orgsync-api: Async client for the office management API (REST + Socket.IO push)

pub mod error;
pub mod model;
pub mod rest;
pub mod transport;
pub mod websocket;

pub use error::Error;
pub use model::{
    EntityId, EntityKind, NewOrganization, NewStaff, Organization, OrganizationOption,
    OrganizationPatch, OrganizationRef, Resource, Staff, StaffPatch, StaffRole,
};
pub use rest::{OfficeApi, ResourceApi, RestClient};
pub use transport::{TlsMode, TransportConfig};
pub use websocket::{
    Backoff, ConnectionState, Connector, PushEvent, ReconnectConfig, TransportChannel, WsConnector,
};
