#[macro_use]
extern crate tracing;

pub mod animation;
pub mod backend;
pub mod cli;
pub mod compositor;
#[cfg(feature = "dbus")]
pub mod dbus;
pub mod display;
pub mod effects;
pub mod frontend;
pub mod handlers;
pub mod input;
pub mod output;
pub mod protocols;
pub mod scene;
pub mod strata;
pub mod texture;
pub mod utils;
pub mod window;
pub mod workspace;
pub mod x11;

#[cfg(test)]
mod tests;

pub use crate::strata::{State, Strata};
