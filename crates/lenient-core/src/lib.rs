//! Admission control for a lenient shutdown of a build cluster.
//!
//! While a shutdown is pending, new unrelated work is held in the queue and
//! chains that were already in flight (plus allow-listed jobs) keep going.
//! The same rules apply cluster-wide and to a single draining node.
//!
//! ```text
//! scheduler ──► LenientShutdown::decide ─────────► gate ──┐
//!          └──► LenientShutdown::decide_on_node ─► node_gate ──┤
//!                                                          ▼
//!                       PermissionRegistry ◄──► CausationGraph ──► JobQueue (host)
//! ```
//!
//! The host owns the queue and nodes and exposes them through [`JobQueue`] and
//! [`NodeRegistry`]; the core keeps only work-item ids.

pub mod causation;
pub mod config;
pub mod error;
pub mod gate;
pub mod ids;
pub mod model;
pub mod node_gate;
pub mod permitted;
pub mod registry;
pub mod shutdown;
pub mod traits;
pub mod types;

pub use causation::*;
pub use config::*;
pub use error::*;
pub use gate::{classify_job, decide, Admission};
pub use ids::*;
pub use model::*;
pub use node_gate::*;
pub use permitted::*;
pub use registry::*;
pub use shutdown::*;
pub use traits::*;
pub use types::*;
