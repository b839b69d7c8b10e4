pub mod adapter;
pub mod banner;
pub mod config;
pub mod consts;
pub mod error;
pub mod runner;
pub mod server;
pub mod tasks;
pub mod template;

pub use adapter::{AdapterOptions, DemoAdapter, InvocationConfig};
pub use error::DemoError;
