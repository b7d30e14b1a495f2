pub mod binance_models;
pub mod coin;
pub mod opportunity;
pub mod order;
pub mod ticker;
pub mod triangle;
