pub mod api;
pub mod blocks;
pub mod config;
pub mod heads;
pub mod model;
pub mod pretrained;
pub mod protein;
pub mod rotary;
pub mod tokenization;
pub mod transformer;
