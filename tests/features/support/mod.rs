
pub use world::*;
