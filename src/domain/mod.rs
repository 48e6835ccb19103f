pub mod fee;
pub mod money;
pub mod ports;
pub mod transaction;
pub mod user;
pub mod wallet;
