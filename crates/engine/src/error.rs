//! The module contains the errors the engine can return.
//!
//! Validation errors ([`InvalidAmount`], [`InvalidParticipants`]) are raised
//! before any store access. Business-rule errors are raised inside the
//! atomic unit and roll the whole operation back. [`ConcurrencyConflict`] is
//! retried internally a bounded number of times before surfacing.
//!
//! [`InvalidAmount`]: EngineError::InvalidAmount
//! [`InvalidParticipants`]: EngineError::InvalidParticipants
//! [`ConcurrencyConflict`]: EngineError::ConcurrencyConflict
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Account not found: {0}")]
    AccountNotFound(String),
    #[error("Transaction not found: id = {0}")]
    TransactionNotFound(i32),
    #[error("Invalid participants: {0}")]
    InvalidParticipants(String),
    #[error("Bank account cannot participate in P2P transfers")]
    BankNotAllowed,
    #[error("IBAN/BIC are required for withdrawal")]
    MissingBankDetails,
    #[error("Insufficient balance: {0}")]
    InsufficientBalance(String),
    #[error("\"{0}\" already registered!")]
    ExistingEmail(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::AccountNotFound(a), Self::AccountNotFound(b)) => a == b,
            (Self::TransactionNotFound(a), Self::TransactionNotFound(b)) => a == b,
            (Self::InvalidParticipants(a), Self::InvalidParticipants(b)) => a == b,
            (Self::BankNotAllowed, Self::BankNotAllowed) => true,
            (Self::MissingBankDetails, Self::MissingBankDetails) => true,
            (Self::InsufficientBalance(a), Self::InsufficientBalance(b)) => a == b,
            (Self::ExistingEmail(a), Self::ExistingEmail(b)) => a == b,
            (Self::Configuration(a), Self::Configuration(b)) => a == b,
            (Self::ConcurrencyConflict(a), Self::ConcurrencyConflict(b)) => a == b,
            (Self::InvalidCursor(a), Self::InvalidCursor(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
