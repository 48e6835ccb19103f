pub mod script_reader;
pub mod script_runner;
pub mod wallet_writer;
