pub mod adapters;
pub mod error;
pub mod logging;
pub mod primitives;
