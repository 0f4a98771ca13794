//! Home Heat Control polling engine
//!
//! Periodically reads the holding registers of a Home Heat Control unit over Modbus
//! TCP, decodes them into typed values, caches them and notifies subscribers once per
//! productive poll. Actuator points (switches, buttons, selects, times, numbers) are
//! written through the same serialized connection.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hhcsrv::{EngineConfig, UpdateEvent};
//!
//! # async fn run() -> errors::HeatResult<()> {
//! let config = EngineConfig::load(None)?;
//! let engine = config.build_engine()?;
//! let reader = engine.clone();
//! let handle = engine
//!     .subscribe(Arc::new(move |_: &UpdateEvent| {
//!         println!("outside: {}", reader.get_value("outsidetemperature"));
//!     }))
//!     .await;
//! engine.set_switch("heatcontrolmanagement_enabled", true).await?;
//! engine.unsubscribe(handle).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod connection;
pub mod constants;
pub mod engine;
pub mod planner;
pub mod point;
pub mod registry;
pub mod simulator;
pub mod subscriber;
pub mod transport;
mod write;

pub use codec::{DecodeRule, DecodedValue, StatusCode, StatusFamily, StatusTable, VersionHalf};
pub use config::EngineConfig;
pub use connection::{ConnectionManager, ConnectionState};
pub use engine::{EngineOptions, PollEngine, PollState, PollStats, TickOutcome, WriteFunction};
pub use errors::{HeatError, HeatResult};
pub use point::{Actuator, Point, PointDefinition, PointKind, SelectOption};
pub use registry::PointRegistry;
pub use simulator::RegisterSimulator;
pub use subscriber::{Observer, SubscriptionHandle, UpdateEvent};
pub use transport::{RegisterTransport, TcpTransport};
