pub mod connection;
pub mod constants;
pub mod parser;
pub mod session;
pub mod transport;
pub mod types;
