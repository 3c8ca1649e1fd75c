//! fleet-control — the control-plane boundary of the fleet manager.
//!
//! Everything that talks to (or stands in for) the cloud control plane
//! lives here.
//!
//! # Components
//!
//! - **`client`** — `ControlPlaneClient` capability trait
//! - **`error`** — transient / permanent / already-absent classification
//! - **`retry`** — bounded exponential-backoff retry with per-attempt timeout
//! - **`cancel`** — cooperative cancellation signal for runs
//! - **`transport`** — HTTPS/1.1 transport (hyper + rustls)
//! - **`google`** — Cloud Run Admin v2 / Cloud SQL Admin v1 client
//! - **`memory`** — in-memory control plane with fault injection

pub mod cancel;
pub mod client;
pub mod error;
pub mod google;
pub mod memory;
pub mod retry;
pub mod transport;

pub use cancel::{CANCELLED, CancelHandle, CancelSignal};
pub use client::ControlPlaneClient;
pub use error::{ControlPlaneError, ControlPlaneResult};
pub use google::{Endpoints, GoogleCloudClient};
pub use memory::{Call, FaultPoint, InMemoryControlPlane};
pub use retry::RetryPolicy;
pub use transport::{HttpResponse, HttpsTransport};
