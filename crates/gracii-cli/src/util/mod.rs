pub mod consts;
pub mod directories;

pub use consts::*;
