//! Wallet ledger engine.
//!
//! Users hold an internal balance and move money between each other and a
//! single bank pseudo-account, for a flat 0.5% fee. The engine computes
//! fees, mutates balances, and appends an immutable transaction record,
//! all inside one database transaction per operation. Retried requests
//! carrying an idempotency key return the original transaction instead of
//! executing twice.
//!
//! The HTTP/UI layer is a separate concern: callers hand the engine an
//! account id (or email, already resolved), an amount, and a description,
//! and get back a [`Transaction`] or a typed [`EngineError`].

pub use accounts::Account;
pub use commands::{TopUpCmd, TransferCmd, WithdrawCmd};
pub use error::EngineError;
pub use money::Money;
pub use ops::{Engine, EngineBuilder, FeedPage};
pub use transactions::{Transaction, TransactionKind};

mod accounts;
mod commands;
mod error;
mod money;
mod ops;
mod transactions;

type ResultEngine<T> = Result<T, EngineError>;
