//! Polling client: keeps a schedule view fresh across flaky connectivity,
//! backgrounding and server outages.

pub mod connectivity;
pub mod poller;
pub mod retry;
pub mod status;
pub mod visibility;

pub use connectivity::{Connectivity, ConnectivityFlag, TcpProbe};
pub use poller::Poller;
pub use retry::{RetryController, RetryError, RetrySession, RetryState};
pub use status::{StatusBoard, StatusMessage, StatusSink};
pub use visibility::VisibilitySuspender;
