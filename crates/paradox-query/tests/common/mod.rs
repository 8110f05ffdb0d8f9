pub mod memory_fixtures;
pub mod paradox_image;
