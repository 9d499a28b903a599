//! The call table into CAPS.
//!
//! [`CapsApi`] lists every native entry point the object wrappers use.
//! [`MockCaps`] implements it in memory for tests; `NativeCaps` (feature
//! `native`) forwards each method to libcaps.

pub mod mock_api;
#[cfg(feature = "native")]
pub mod native;
pub mod traits;
pub mod types;

pub use mock_api::{MockAim, MockCaps};
#[cfg(feature = "native")]
pub use native::{NativeCaps, NativeUnits};
pub use traits::*;
pub use types::*;
