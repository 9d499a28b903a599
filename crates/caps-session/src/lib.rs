//! Safe, owned wrappers over a CAPS session.
//!
//! [`Caps`] is built once from a [`CapsConfig`]: it resolves the call
//! table, merges the error-code tables and picks a unit system. Everything
//! else hangs off a [`Problem`] opened through it. Owning wrappers
//! ([`Problem`], user [`ValueObj`]s, [`Bound`]) release their native object
//! in `Drop`; the rest are views borrowed from the Problem.

pub mod analysis;
pub mod attr;
pub mod bound;
pub mod config;
pub mod exec;
pub mod problem;
pub mod session;
pub mod value;

pub use analysis::Analysis;
pub use attr::{Attribute, Attributes};
pub use bound::{Bound, DataSet, VertexSet};
pub use config::{CapsConfig, OutLevel};
pub use exec::{run_in_dir, ExecOutcome};
pub use problem::Problem;
pub use session::Caps;
pub use value::{ValueData, ValueObj};

pub use caps_api::{AnalysisSpec, ProblemSource};
pub use caps_types::CapsError;
pub use caps_units::Quantity;
pub use value_codec::Value;
