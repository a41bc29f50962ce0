pub mod frequency;
pub mod power;
