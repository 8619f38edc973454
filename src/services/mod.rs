pub mod availability;
pub mod orders;

pub use availability::AvailabilityQuery;
pub use orders::{OrderService, PlacementStage};
