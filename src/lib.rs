//! FluentControl - Liquid Handling Instrument Client
//!
//! Validates deck layouts and transfer plans, submits them to a FluentControl
//! instrument over HTTP and tracks each transfer session to completion.
//!
//! # Modules
//!
//! - [`deck`] - Labware positions and deck layouts
//! - [`plan`] - Transfer specs and plans
//! - [`catalog`] - Liquid classes, tips, labware volumes, protocols
//! - [`presets`] - Named decks, transfer patterns, standard transfer
//! - [`validation`] - Layout and plan checks run before anything is sent
//! - [`transport`] - Instrument HTTP seam and typed endpoint replies
//! - [`session`] - Session state machine and polling monitor
//! - [`client`] - Facade tying the above together

// Instrument model
pub mod catalog;
pub mod deck;
pub mod plan;
pub mod presets;
pub mod validation;

// Instrument I/O
pub mod client;
pub mod session;
pub mod transport;

// Ambient
pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use catalog::{Catalog, TransferProtocol};
pub use client::{ClientError, FluentClient};
pub use deck::{LabwareType, Layout, Position, PositionStatus};
pub use plan::{TransferPlan, TransferSpec};
pub use session::{Monitor, MonitorConfig, MonitorError, Session, SessionError, SessionState};
pub use transport::{Credentials, HttpTransport, Transport, TransportError};
pub use validation::{LayoutError, PlanError, ValidationError};
