//! Fixpoint Runtime
//!
//! Executes synchronous actor networks under fixed-point semantics. Within
//! one instant every channel starts unknown and is driven to a known value,
//! present or absent, by repeated monotone evaluation of actors until
//! nothing more can become known.
//!
//! ```ignore
//! let mut network = Network::new();
//! network.add_actor("a", Const::new(1i64))?;
//! network.add_actor("b", Map::add(1))?;
//! network.connect("a.out", "b.in")?;
//! network.expose_output("b.out", "result")?;
//!
//! let mut director = Director::new(network);
//! director.initialize()?;
//! let report = director.run_instant()?;
//! assert_eq!(report.output("result"), Some(Some(&Value::Integer(2))));
//! ```

pub mod actor;
pub mod actors;
pub mod config;
pub mod dag;
pub mod director;
pub mod error;
pub mod network;
pub mod report;
pub mod schedule;
pub mod storage;
pub mod types;

pub use actor::{Actor, FiringContext, Inputs, PortSpec};
pub use config::{ConfigError, DirectorConfig, TieBreak, UnresolvedPolicy};
pub use dag::{DefaultCausality, DependencyAnalyzer, DependencyGraph};
pub use director::{Director, StopHandle};
pub use error::{Error, Result, Unresolved, Warning};
pub use network::Network;
pub use report::{CellReport, InstantReport, RunReport, StopReason};
pub use schedule::{Schedule, Scheduler};
pub use storage::{CellStatus, CellTable, SignalCell};
pub use types::*;
