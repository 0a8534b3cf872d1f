pub mod aside;
pub mod engine;
pub mod navigator;
