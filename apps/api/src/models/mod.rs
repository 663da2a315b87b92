pub mod analysis;
pub mod credits;
