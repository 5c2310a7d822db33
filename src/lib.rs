//! pulp-courier: push, delete and publish content through a Pulp-style
//! catalog service, with ordered CDN/UD cache flushing.

pub mod cache;
pub mod cli;
pub mod client;
pub mod collector;
pub mod criteria;
pub mod delete;
pub mod error;
pub mod items;
pub mod publisher;
pub mod push;
pub mod source;
pub mod unit;

pub use cli::{run, Cli, Commands};
pub use error::{CourierError, Result};
