use sea_orm::{ActiveValue, ConnectionTrait, QueryFilter, TransactionTrait, prelude::*};

use crate::{Account, EngineError, Money, ResultEngine, accounts};

use super::{Engine, is_unique_violation, normalize_email, normalize_optional_text, with_tx};

impl Engine {
    /// Creates a regular account with a zero balance.
    ///
    /// The email is normalized (trimmed, lowercased) and must be unique;
    /// uniqueness is backed by an index, so a concurrent duplicate insert
    /// also surfaces as [`EngineError::ExistingEmail`].
    pub async fn create_account(
        &self,
        username: &str,
        email: &str,
        iban: Option<&str>,
        bic: Option<&str>,
    ) -> ResultEngine<Account> {
        let username = username.trim();
        if username.is_empty() {
            return Err(EngineError::InvalidParticipants(
                "username must not be empty".to_string(),
            ));
        }
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(EngineError::InvalidParticipants(
                "email must not be empty".to_string(),
            ));
        }

        let account = Account {
            id: 0,
            username: username.to_string(),
            email: email.clone(),
            balance: Money::ZERO,
            version: 0,
            iban: normalize_optional_text(iban),
            bic: normalize_optional_text(bic),
            is_bank: false,
        };

        with_tx!(self, |db_tx| {
            if self.find_by_email(&db_tx, &email).await?.is_some() {
                return Err(EngineError::ExistingEmail(email.clone()));
            }

            let active = accounts::ActiveModel::from(&account);
            match active.insert(&db_tx).await {
                Ok(model) => Ok(Account::from(model)),
                Err(err) if is_unique_violation(&err) => Err(EngineError::ExistingEmail(email)),
                Err(err) => Err(err.into()),
            }
        })
    }

    /// Seeds the single bank pseudo-account, idempotently.
    ///
    /// If a bank account already exists it is returned unchanged; a second
    /// `is_bank` row is never created. Deployments run this once before
    /// serving traffic.
    pub async fn ensure_bank_account(&self, username: &str, email: &str) -> ResultEngine<Account> {
        let email = normalize_email(email);
        with_tx!(self, |db_tx| {
            let existing = accounts::Entity::find()
                .filter(accounts::Column::IsBank.eq(true))
                .all(&db_tx)
                .await?;
            match existing.len() {
                0 => {}
                1 => {
                    let model = existing.into_iter().next().ok_or_else(|| {
                        EngineError::Configuration("bank account not found".to_string())
                    })?;
                    return Ok(Account::from(model));
                }
                n => {
                    return Err(EngineError::Configuration(format!(
                        "expected exactly one bank account, found {n}"
                    )));
                }
            }

            let active = accounts::ActiveModel {
                id: ActiveValue::NotSet,
                username: ActiveValue::Set(username.trim().to_string()),
                email: ActiveValue::Set(email.clone()),
                balance_minor: ActiveValue::Set(0),
                version: ActiveValue::Set(0),
                iban: ActiveValue::Set(None),
                bic: ActiveValue::Set(None),
                is_bank: ActiveValue::Set(true),
            };
            let model = active.insert(&db_tx).await?;
            tracing::info!(account_id = model.id, "bank account seeded");
            Ok(Account::from(model))
        })
    }

    /// Returns an account by id.
    pub async fn account(&self, account_id: i32) -> ResultEngine<Account> {
        let model = self.require_account(&self.database, account_id).await?;
        Ok(Account::from(model))
    }

    /// Returns an account by (normalized) email.
    pub async fn account_by_email(&self, email: &str) -> ResultEngine<Account> {
        let email = normalize_email(email);
        let model = self
            .find_by_email(&self.database, &email)
            .await?
            .ok_or(EngineError::AccountNotFound(email))?;
        Ok(Account::from(model))
    }

    /// Current balance of an account.
    pub async fn get_balance(&self, account_id: i32) -> ResultEngine<Money> {
        let model = self.require_account(&self.database, account_id).await?;
        Ok(Money::new(model.balance_minor))
    }

    /// Records the external bank coordinates needed before a withdrawal.
    pub async fn update_bank_details(
        &self,
        account_id: i32,
        iban: &str,
        bic: &str,
    ) -> ResultEngine<()> {
        let iban = normalize_optional_text(Some(iban));
        let bic = normalize_optional_text(Some(bic));
        if iban.is_none() || bic.is_none() {
            return Err(EngineError::MissingBankDetails);
        }

        with_tx!(self, |db_tx| {
            self.require_account(&db_tx, account_id).await?;
            let active = accounts::ActiveModel {
                id: ActiveValue::Set(account_id),
                iban: ActiveValue::Set(iban),
                bic: ActiveValue::Set(bic),
                ..Default::default()
            };
            active.update(&db_tx).await?;
            Ok(())
        })
    }

    pub(super) async fn require_account(
        &self,
        db: &impl ConnectionTrait,
        account_id: i32,
    ) -> ResultEngine<accounts::Model> {
        accounts::Entity::find_by_id(account_id)
            .one(db)
            .await?
            .ok_or_else(|| EngineError::AccountNotFound(format!("id = {account_id}")))
    }

    pub(super) async fn find_by_email(
        &self,
        db: &impl ConnectionTrait,
        email: &str,
    ) -> ResultEngine<Option<accounts::Model>> {
        Ok(accounts::Entity::find()
            .filter(accounts::Column::Email.eq(email))
            .one(db)
            .await?)
    }

    /// Locates the unique bank pseudo-account.
    ///
    /// Zero or more than one `is_bank` row is a broken deployment, reported
    /// as [`EngineError::Configuration`] rather than a per-request failure.
    pub(super) async fn resolve_bank(
        &self,
        db: &impl ConnectionTrait,
    ) -> ResultEngine<accounts::Model> {
        let banks = accounts::Entity::find()
            .filter(accounts::Column::IsBank.eq(true))
            .all(db)
            .await?;
        if banks.len() > 1 {
            return Err(EngineError::Configuration(format!(
                "expected exactly one bank account, found {}",
                banks.len()
            )));
        }
        banks
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Configuration("bank account not found".to_string()))
    }
}
