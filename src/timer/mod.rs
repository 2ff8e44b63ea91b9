pub mod config;
pub mod delay;
pub mod price;
pub mod selection;
