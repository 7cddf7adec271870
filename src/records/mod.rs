pub mod index;
pub mod loader;
pub mod types;
