//! Units, unit types and the orders the AI issues to them

pub mod equivalence;
pub mod orders;
pub mod unit;
pub mod unit_type;

pub use equivalence::UnitTypeEquivalence;
pub use orders::{Directives, OrderKind, ProductionRequest, StanceChange, UnitOrder};
pub use unit::{OccupancyIndex, Unit, UnitStore};
pub use unit_type::{UnitDomain, UnitType, UnitTypeCatalog};
