//! Transaction primitives.
//!
//! A `Transaction` is an immutable, append-only ledger entry recording one
//! money movement. Both parties are always real account rows; for top-ups
//! the sender is the bank pseudo-account, for withdrawals the receiver is.
//!
//! The gross/fee/net split depends on the kind:
//! - `TopUp`: the fee is deducted from the credited side (`net = gross - fee`)
//! - `Withdrawal`/`P2pTransfer`: the fee is charged on top of the debited
//!   side (`net = gross`, the sender pays `gross + fee`)
//!
//! What holds for every record is `fee = round2(gross * 0.005)`.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, Money, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    TopUp,
    Withdrawal,
    P2pTransfer,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TopUp => "top_up",
            Self::Withdrawal => "withdrawal",
            Self::P2pTransfer => "p2p_transfer",
        }
    }
}

impl TryFrom<&str> for TransactionKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "top_up" => Ok(Self::TopUp),
            "withdrawal" => Ok(Self::Withdrawal),
            "p2p_transfer" => Ok(Self::P2pTransfer),
            other => Err(EngineError::Configuration(format!(
                "invalid transaction kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i32,
    pub kind: TransactionKind,
    pub sender_id: i32,
    pub receiver_id: i32,
    /// Amount entered by the initiating party.
    pub gross_amount: Money,
    /// `round2(gross * 0.005)`, retained by the system.
    pub fee_amount: Money,
    /// Amount actually credited to (or leaving for) the beneficiary.
    pub net_amount: Money,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    /// At most one transaction may exist per non-null key.
    pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub kind: String,
    pub sender_id: i32,
    pub receiver_id: i32,
    pub gross_minor: i64,
    pub fee_minor: i64,
    pub net_minor: i64,
    pub description: Option<String>,
    pub created_at: DateTimeUtc,
    pub idempotency_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::SenderId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Sender,
    #[sea_orm(
        belongs_to = "super::accounts::Entity",
        from = "Column::ReceiverId",
        to = "super::accounts::Column::Id",
        on_update = "NoAction",
        on_delete = "NoAction"
    )]
    Receiver,
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: model.id,
            kind: TransactionKind::try_from(model.kind.as_str())?,
            sender_id: model.sender_id,
            receiver_id: model.receiver_id,
            gross_amount: Money::new(model.gross_minor),
            fee_amount: Money::new(model.fee_minor),
            net_amount: Money::new(model.net_minor),
            description: model.description,
            created_at: model.created_at,
            idempotency_key: model.idempotency_key,
        })
    }
}

/// Builds the `ActiveModel` for a new ledger entry. The id is assigned by
/// the store and `created_at` is server time.
pub(crate) fn new_active_model(
    kind: TransactionKind,
    sender_id: i32,
    receiver_id: i32,
    gross: Money,
    fee: Money,
    net: Money,
    description: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
) -> ActiveModel {
    ActiveModel {
        id: ActiveValue::NotSet,
        kind: ActiveValue::Set(kind.as_str().to_string()),
        sender_id: ActiveValue::Set(sender_id),
        receiver_id: ActiveValue::Set(receiver_id),
        gross_minor: ActiveValue::Set(gross.cents()),
        fee_minor: ActiveValue::Set(fee.cents()),
        net_minor: ActiveValue::Set(net.cents()),
        description: ActiveValue::Set(description),
        created_at: ActiveValue::Set(created_at),
        idempotency_key: ActiveValue::Set(idempotency_key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_storage_strings() {
        for kind in [
            TransactionKind::TopUp,
            TransactionKind::Withdrawal,
            TransactionKind::P2pTransfer,
        ] {
            assert_eq!(TransactionKind::try_from(kind.as_str()).unwrap(), kind);
        }
        assert!(TransactionKind::try_from("refund").is_err());
    }
}
