//! Site implementations.
//!
//! - [`jm`] - The JM comic site: album and chapter metadata, search,
//!   mirror probing and max-page estimation

pub mod jm;

pub use jm::JmSource;
