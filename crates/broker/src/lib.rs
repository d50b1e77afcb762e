//! Correlation and delivery broker for results that outlive their container.
//!
//! A runtime may destroy and recreate a container at any time, while an
//! [`Owner`] retained in the container's [`SessionScope`] survives. Work
//! launched through the container reports back through one untyped entry
//! point keyed by a [`CorrelationId`]. The broker:
//!
//! * allocates ids and keeps a per-owner table of pending requests;
//! * matches completions arriving on any thread ([`IntakeHandle`]);
//! * stages matched results until the owner is active, then resolves the
//!   caller's [`Continuation`] in FIFO order;
//! * turns a fired cancellation token into a `CANCELLED` outcome;
//! * hands a survivable component created by the request to a caller
//!   initializer, across any number of container recreations, watching the
//!   process-wide [`LifecycleHub`] only while such requests are outstanding.
//!
//! Failures reach callers only as a [`StatusCode`] on the delivered
//! [`Outcome`]; the broker itself never fails a continuation.

pub mod boundary;
pub mod broker;
pub mod cancel;
pub mod config;
pub mod container;
pub mod error;
pub mod gate;
pub mod hub;
pub mod id;
pub mod intake;
pub mod observer;
pub mod outcome;
pub mod owner;
mod pending;
pub mod promise;
pub mod registry;

pub use boundary::{Boundary, BoundaryError, LaunchContext, LaunchRequest};
pub use broker::Broker;
pub use cancel::{CancelGuard, CancellationBridge};
pub use config::BrokerConfig;
pub use container::{ComponentHandle, Container, ContainerId, CreationParams};
pub use error::{Error, Result};
pub use gate::{FlushReport, OwnerPhase};
pub use hub::{ContainerObserver, LifecycleHub, ObserverKey};
pub use id::{CorrelationId, FIRST_BROKER_ID, IdAllocator};
pub use intake::{Completion, IntakeHandle};
pub use observer::{ComponentInitializer, ObserverLifecycleManager};
pub use outcome::{Outcome, Payload, StatusCode};
pub use owner::{Owner, OwnerKey, OwnerSnapshot, RequestOptions};
pub use promise::Continuation;
pub use registry::{ScopeId, SessionScope, Survivable, SurvivableTag};
pub use tokio_util::sync::CancellationToken;
