//! Domain model of the payment saga: money, accounts, the saga record, its
//! state machine and the ports the application layer depends on.

pub mod account;
pub mod events;
pub mod payment;
pub mod ports;
pub mod state;
