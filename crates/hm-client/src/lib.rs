//! hm-client - GraphQL session client for Home Monitor
//!
//! Keeps the credential, routes operations to the HTTP or streaming transport,
//! and refreshes an expired credential once for all concurrent callers.

pub mod client;
pub mod dispatcher;
pub mod error;
pub mod io;
pub mod operation;
pub mod refresh;
pub mod session;
pub mod ws;

pub use client::GraphQlClient;
pub use dispatcher::{Dispatched, Dispatcher, Endpoints, Route, Subscription};
pub use error::{ClientError, Result};
pub use io::{HttpTransport, MessageStream, ReqwestHttpTransport, StreamTransport};
pub use operation::{Operation, OperationKind};
pub use refresh::{RefreshCoordinator, SessionTerminationHandler, TokenRefresher};
pub use session::{
    CredentialStore, FileKeyValueStore, KeyValueStore, MemoryKeyValueStore, Session, UserProfile,
};
pub use ws::WsStreamTransport;
