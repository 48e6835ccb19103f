pub mod approval;
pub mod collection;
pub mod events;
pub mod fees;
pub mod ledger;
pub mod notifications;
pub mod payout;
pub mod platform;
pub mod rail;
pub mod statements;
pub mod transfer;
pub mod wallets;
pub mod withdrawal;
