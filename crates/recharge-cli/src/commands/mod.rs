pub mod config;
pub mod recharge;
pub mod sweeper;
