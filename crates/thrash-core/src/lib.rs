pub mod config;
pub mod distribution;
pub mod error;
pub mod executor;
pub mod pipeline;
pub mod report;
pub mod stats;
pub mod target;

pub use config::*;
pub use distribution::*;
pub use error::*;
pub use executor::*;
pub use pipeline::*;
pub use report::*;
pub use stats::*;
pub use target::*;
