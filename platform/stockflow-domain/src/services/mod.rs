pub mod normalize;
pub mod validation;
pub mod window;
