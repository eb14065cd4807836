pub mod interval;
pub mod price_row;
pub mod ticker;
pub mod window;
