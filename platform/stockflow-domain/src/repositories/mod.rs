pub mod price_provider;
pub mod price_store;
