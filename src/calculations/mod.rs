pub mod conflicts;
pub mod move_validation;
