pub mod effects;
pub mod endpoints;
pub mod engine;
pub mod meter;
pub mod nn;
pub mod placement;
pub mod pubsub;
pub mod session;
pub mod surface;
pub mod utils;
