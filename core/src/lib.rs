#[macro_use]
extern crate log;

pub mod clock;
pub mod config;
pub mod datatype;
pub mod error;
pub mod fifo;
pub mod graph;
pub mod numeric;
