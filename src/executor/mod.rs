pub mod clicker;
pub mod input;
