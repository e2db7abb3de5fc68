//! Account primitives.
//!
//! An `Account` holds a user's internal balance. Exactly one account per
//! deployment carries the `is_bank` flag: it stands in for money entering
//! or leaving the application and is the counterparty of every top-up and
//! withdrawal. The `version` column is bumped on every balance write and
//! backs the engine's optimistic-concurrency checks.

use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::Money;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: i32,
    pub username: String,
    /// Normalized (trimmed, lowercased) and unique.
    pub email: String,
    pub balance: Money,
    /// Incremented on every committed balance mutation.
    pub version: i64,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub is_bank: bool,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub username: String,
    pub email: String,
    pub balance_minor: i64,
    pub version: i64,
    pub iban: Option<String>,
    pub bic: Option<String>,
    pub is_bank: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Account {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            balance: Money::new(model.balance_minor),
            version: model.version,
            iban: model.iban,
            bic: model.bic,
            is_bank: model.is_bank,
        }
    }
}

impl From<&Account> for ActiveModel {
    fn from(account: &Account) -> Self {
        Self {
            id: ActiveValue::NotSet,
            username: ActiveValue::Set(account.username.clone()),
            email: ActiveValue::Set(account.email.clone()),
            balance_minor: ActiveValue::Set(account.balance.cents()),
            version: ActiveValue::Set(account.version),
            iban: ActiveValue::Set(account.iban.clone()),
            bic: ActiveValue::Set(account.bic.clone()),
            is_bank: ActiveValue::Set(account.is_bank),
        }
    }
}
