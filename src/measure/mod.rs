pub mod lifetime_measurer;

pub use lifetime_measurer::{LifetimeMeasurer, LifetimeStats};
