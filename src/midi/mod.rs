pub mod decoder;
pub mod names;
pub mod sink;
