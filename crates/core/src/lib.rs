#![forbid(unsafe_code)]

//! Domain core for the timed assessment engine.
//!
//! Everything in this crate is pure: catalog entities, the session state
//! machine, scoring, and time arithmetic. I/O lives behind the `storage`
//! crate's repository traits and is orchestrated by `services`.

pub mod error;
pub mod model;
pub mod scoring;
pub mod session;
pub mod time;

pub use error::Error;
pub use time::Clock;
