pub mod postgres_prices;
