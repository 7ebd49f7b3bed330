// Macros (must be first for visibility)
#[macro_use]
pub mod macros;

pub mod affinity;
pub mod cache;
pub mod error;
pub mod hostfs;
pub mod human;
pub mod knobs;
pub mod msr;
pub mod platform;
pub mod props;
pub mod topology;

pub use error::{PwrknobError, Result};
pub use knobs::{PowerKnobs, PowerKnobsBuilder};
pub use props::{MechanismId, PropertyId, PropertyValue, ValueRecord};
pub use topology::{ScopeUnit, TargetSpec, Topology};
