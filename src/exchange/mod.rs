pub mod balances;
pub mod binance;
pub mod book_ticker_stream;
pub mod client;
pub mod paper;
