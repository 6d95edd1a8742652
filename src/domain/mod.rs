// Domain layer - Ride disambiguation engine, no I/O
pub mod geo;
pub mod projector;
pub mod ride;
pub mod snapshot;
pub mod vehicle;
