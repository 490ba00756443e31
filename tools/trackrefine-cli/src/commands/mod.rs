pub mod config;
pub mod info;
pub mod interpolate;
pub mod likelihood;
pub mod normalize;
pub mod position;
pub mod run;
pub mod validate;
