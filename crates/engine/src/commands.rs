//! Command structs for engine operations.
//!
//! These types group parameters for the money-movement operations, keeping
//! call sites readable and avoiding long argument lists.

use crate::Money;

/// Credit an account from the outside world (via the bank pseudo-account).
#[derive(Clone, Debug)]
pub struct TopUpCmd {
    pub account_id: i32,
    pub amount: Money,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl TopUpCmd {
    #[must_use]
    pub fn new(account_id: i32, amount: Money) -> Self {
        Self {
            account_id,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Move money from an account out to its registered external bank account.
#[derive(Clone, Debug)]
pub struct WithdrawCmd {
    pub account_id: i32,
    pub amount: Money,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl WithdrawCmd {
    #[must_use]
    pub fn new(account_id: i32, amount: Money) -> Self {
        Self {
            account_id,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Move money between two user accounts; the sender pays the fee on top.
#[derive(Clone, Debug)]
pub struct TransferCmd {
    pub sender_id: i32,
    pub receiver_id: i32,
    pub amount: Money,
    pub description: Option<String>,
    pub idempotency_key: Option<String>,
}

impl TransferCmd {
    #[must_use]
    pub fn new(sender_id: i32, receiver_id: i32, amount: Money) -> Self {
        Self {
            sender_id,
            receiver_id,
            amount,
            description: None,
            idempotency_key: None,
        }
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}
