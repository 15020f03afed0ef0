//! Domain types: bars and validated bar series.

pub mod bar;
pub mod series;

pub use bar::Bar;
pub use series::{BarSeries, IntegrityError};
