pub mod pow2;
pub mod telemetry;

pub use pow2::*;
pub use telemetry::*;
