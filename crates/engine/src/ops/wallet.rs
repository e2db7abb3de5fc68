//! The three money-movement operations: top-up, withdrawal, peer transfer.
//!
//! Every operation runs as one database transaction spanning the
//! idempotency-key lookup, the balance read, the transaction insert and the
//! balance write. Balance writes are conditional on the account row's
//! `version`; a lost race surfaces as `ConcurrencyConflict` and the whole
//! unit is retried a bounded number of times.
//!
//! The ledger row is inserted *before* any balance write, so a duplicate
//! idempotency key (unique index) aborts the unit with nothing applied; the
//! engine then re-reads and returns the winner's transaction.

use chrono::Utc;
use sea_orm::{
    ConnectionTrait, DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*,
    sea_query::Expr,
};

use crate::{
    EngineError, Money, ResultEngine, TopUpCmd, Transaction, TransactionKind, TransferCmd,
    WithdrawCmd, accounts, transactions,
};

use super::{Engine, MAX_WRITE_ATTEMPTS, is_unique_violation, normalize_optional_text};

fn validate_amount(amount: Money) -> ResultEngine<Money> {
    if amount < Money::MIN_AMOUNT {
        return Err(EngineError::InvalidAmount(format!(
            "amount must be >= {}",
            Money::MIN_AMOUNT
        )));
    }
    if amount > Money::MAX_AMOUNT {
        return Err(EngineError::InvalidAmount(format!(
            "amount must be <= {}",
            Money::MAX_AMOUNT
        )));
    }
    Ok(amount)
}

impl Engine {
    /// Credits an account from the outside world through the bank
    /// pseudo-account, minus the 0.5% fee (`net = gross - fee`).
    pub async fn top_up(&self, cmd: TopUpCmd) -> ResultEngine<Transaction> {
        let gross = validate_amount(cmd.amount)?;
        let description = normalize_optional_text(cmd.description.as_deref());
        let key = normalize_optional_text(cmd.idempotency_key.as_deref());

        tracing::info!(account_id = cmd.account_id, amount = %gross, "top-up start");
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self
                .try_top_up(cmd.account_id, gross, description.as_deref(), key.as_deref())
                .await
            {
                Err(EngineError::ConcurrencyConflict(reason)) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "top-up version conflict, retrying");
                }
                other => break other,
            }
        };
        match &result {
            Ok(tx) => tracing::info!(
                tx_id = tx.id,
                gross = %tx.gross_amount,
                fee = %tx.fee_amount,
                net = %tx.net_amount,
                "top-up success"
            ),
            Err(err) => tracing::warn!(account_id = cmd.account_id, %err, "top-up failed"),
        }
        result
    }

    async fn try_top_up(
        &self,
        account_id: i32,
        gross: Money,
        description: Option<&str>,
        key: Option<&str>,
    ) -> ResultEngine<Transaction> {
        let db_tx = self.database.begin().await?;

        if let Some(existing) = self.find_by_idempotency_key(&db_tx, key).await? {
            return Transaction::try_from(existing);
        }

        let account = self.require_account(&db_tx, account_id).await?;
        let bank = self.resolve_bank(&db_tx).await?;

        let fee = gross.fee();
        let net = gross - fee;
        let description = description.map_or_else(|| "Top up".to_string(), ToString::to_string);

        let inserted = match transactions::new_active_model(
            TransactionKind::TopUp,
            bank.id,
            account.id,
            gross,
            fee,
            net,
            Some(description),
            key.map(ToString::to_string),
            Utc::now(),
        )
        .insert(&db_tx)
        .await
        {
            Ok(model) => model,
            Err(err) if key.is_some() && is_unique_violation(&err) => {
                drop(db_tx);
                return self.replay_by_idempotency_key(key).await;
            }
            Err(err) => return Err(err.into()),
        };

        // Top-up never debits, so no balance check is needed.
        self.apply_balance_delta(&db_tx, &account, net.cents())
            .await?;

        db_tx.commit().await?;
        Transaction::try_from(inserted)
    }

    /// Debits `gross + fee` from an account and records the gross amount as
    /// leaving the system towards the account's registered IBAN/BIC.
    pub async fn withdraw_to_bank(&self, cmd: WithdrawCmd) -> ResultEngine<Transaction> {
        let gross = validate_amount(cmd.amount)?;
        let description = normalize_optional_text(cmd.description.as_deref());
        let key = normalize_optional_text(cmd.idempotency_key.as_deref());

        tracing::info!(account_id = cmd.account_id, amount = %gross, "withdrawal start");
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self
                .try_withdraw(cmd.account_id, gross, description.as_deref(), key.as_deref())
                .await
            {
                Err(EngineError::ConcurrencyConflict(reason)) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "withdrawal version conflict, retrying");
                }
                other => break other,
            }
        };
        match &result {
            Ok(tx) => tracing::info!(
                tx_id = tx.id,
                gross = %tx.gross_amount,
                fee = %tx.fee_amount,
                "withdrawal success"
            ),
            Err(err) => tracing::warn!(account_id = cmd.account_id, %err, "withdrawal failed"),
        }
        result
    }

    async fn try_withdraw(
        &self,
        account_id: i32,
        gross: Money,
        description: Option<&str>,
        key: Option<&str>,
    ) -> ResultEngine<Transaction> {
        let db_tx = self.database.begin().await?;

        if let Some(existing) = self.find_by_idempotency_key(&db_tx, key).await? {
            return Transaction::try_from(existing);
        }

        let account = self.require_account(&db_tx, account_id).await?;
        if account.iban.is_none() || account.bic.is_none() {
            return Err(EngineError::MissingBankDetails);
        }
        let bank = self.resolve_bank(&db_tx).await?;

        let fee = gross.fee();
        // The fee is charged on top of the withdrawn amount.
        let total_debit = gross + fee;
        if Money::new(account.balance_minor) < total_debit {
            return Err(EngineError::InsufficientBalance(format!(
                "balance {} < required {total_debit}",
                Money::new(account.balance_minor)
            )));
        }

        let description =
            description.map_or_else(|| "Withdrawal to bank".to_string(), ToString::to_string);

        // `net` is what leaves the system to the external bank: the gross
        // amount requested. The fee is the system's margin.
        let inserted = match transactions::new_active_model(
            TransactionKind::Withdrawal,
            account.id,
            bank.id,
            gross,
            fee,
            gross,
            Some(description),
            key.map(ToString::to_string),
            Utc::now(),
        )
        .insert(&db_tx)
        .await
        {
            Ok(model) => model,
            Err(err) if key.is_some() && is_unique_violation(&err) => {
                drop(db_tx);
                return self.replay_by_idempotency_key(key).await;
            }
            Err(err) => return Err(err.into()),
        };

        self.apply_balance_delta(&db_tx, &account, -total_debit.cents())
            .await?;

        db_tx.commit().await?;
        Transaction::try_from(inserted)
    }

    /// Moves `gross` from sender to receiver; the sender pays `gross + fee`,
    /// the receiver gets the full gross amount.
    pub async fn transfer_p2p(&self, cmd: TransferCmd) -> ResultEngine<Transaction> {
        if cmd.sender_id == cmd.receiver_id {
            return Err(EngineError::InvalidParticipants(
                "sender and receiver must differ".to_string(),
            ));
        }
        let gross = validate_amount(cmd.amount)?;
        let description = normalize_optional_text(cmd.description.as_deref());
        let key = normalize_optional_text(cmd.idempotency_key.as_deref());

        tracing::info!(
            sender_id = cmd.sender_id,
            receiver_id = cmd.receiver_id,
            amount = %gross,
            "p2p transfer start"
        );
        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self
                .try_transfer(
                    cmd.sender_id,
                    cmd.receiver_id,
                    gross,
                    description.as_deref(),
                    key.as_deref(),
                )
                .await
            {
                Err(EngineError::ConcurrencyConflict(reason)) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(attempt, %reason, "transfer version conflict, retrying");
                }
                other => break other,
            }
        };
        match &result {
            Ok(tx) => tracing::info!(
                tx_id = tx.id,
                gross = %tx.gross_amount,
                fee = %tx.fee_amount,
                "p2p transfer success"
            ),
            Err(err) => tracing::warn!(
                sender_id = cmd.sender_id,
                receiver_id = cmd.receiver_id,
                %err,
                "p2p transfer failed"
            ),
        }
        result
    }

    async fn try_transfer(
        &self,
        sender_id: i32,
        receiver_id: i32,
        gross: Money,
        description: Option<&str>,
        key: Option<&str>,
    ) -> ResultEngine<Transaction> {
        let db_tx = self.database.begin().await?;

        let bank = self.resolve_bank(&db_tx).await?;
        if sender_id == bank.id || receiver_id == bank.id {
            return Err(EngineError::BankNotAllowed);
        }

        if let Some(existing) = self.find_by_idempotency_key(&db_tx, key).await? {
            return Transaction::try_from(existing);
        }

        let sender = self.require_account(&db_tx, sender_id).await?;
        let receiver = self.require_account(&db_tx, receiver_id).await?;

        let fee = gross.fee();
        // The fee is borne entirely by the sender; the receiver gets the
        // full gross amount.
        let total_debit = gross + fee;
        if Money::new(sender.balance_minor) < total_debit {
            return Err(EngineError::InsufficientBalance(format!(
                "balance {} < required {total_debit}",
                Money::new(sender.balance_minor)
            )));
        }

        let description = description.map_or_else(
            || format!("Transfer to {}", receiver.email),
            ToString::to_string,
        );

        let inserted = match transactions::new_active_model(
            TransactionKind::P2pTransfer,
            sender.id,
            receiver.id,
            gross,
            fee,
            gross,
            Some(description),
            key.map(ToString::to_string),
            Utc::now(),
        )
        .insert(&db_tx)
        .await
        {
            Ok(model) => model,
            Err(err) if key.is_some() && is_unique_violation(&err) => {
                drop(db_tx);
                return self.replay_by_idempotency_key(key).await;
            }
            Err(err) => return Err(err.into()),
        };

        // Balance writes in ascending account id order, so two transfers
        // going in opposite directions between the same pair never deadlock.
        let mut writes = [
            (&sender, -total_debit.cents()),
            (&receiver, gross.cents()),
        ];
        writes.sort_by_key(|(account, _)| account.id);
        for (account, delta_minor) in writes {
            self.apply_balance_delta(&db_tx, account, delta_minor)
                .await?;
        }

        db_tx.commit().await?;
        Transaction::try_from(inserted)
    }

    /// Applies a signed delta to an account balance, conditional on the
    /// version read at the start of the unit. Zero rows affected means a
    /// concurrent writer got there first.
    async fn apply_balance_delta(
        &self,
        db_tx: &DatabaseTransaction,
        account: &accounts::Model,
        delta_minor: i64,
    ) -> ResultEngine<()> {
        let new_balance = account
            .balance_minor
            .checked_add(delta_minor)
            .ok_or_else(|| EngineError::InvalidAmount("balance overflow".to_string()))?;

        let updated = accounts::Entity::update_many()
            .col_expr(accounts::Column::BalanceMinor, Expr::value(new_balance))
            .col_expr(accounts::Column::Version, Expr::value(account.version + 1))
            .filter(accounts::Column::Id.eq(account.id))
            .filter(accounts::Column::Version.eq(account.version))
            .exec(db_tx)
            .await?;

        if updated.rows_affected != 1 {
            return Err(EngineError::ConcurrencyConflict(format!(
                "account {} was modified concurrently",
                account.id
            )));
        }
        Ok(())
    }

    async fn find_by_idempotency_key(
        &self,
        db: &impl ConnectionTrait,
        key: Option<&str>,
    ) -> ResultEngine<Option<transactions::Model>> {
        let Some(key) = key else { return Ok(None) };
        Ok(transactions::Entity::find()
            .filter(transactions::Column::IdempotencyKey.eq(key))
            .one(db)
            .await?)
    }

    /// After a unique-index violation on insert, the rolled-back loser
    /// re-reads the committed winner and returns it unchanged.
    async fn replay_by_idempotency_key(&self, key: Option<&str>) -> ResultEngine<Transaction> {
        let existing = self.find_by_idempotency_key(&self.database, key).await?;
        match existing {
            Some(model) => Transaction::try_from(model),
            // The winner has not committed yet; report a retryable conflict
            // so the outer loop re-runs the lookup.
            None => Err(EngineError::ConcurrencyConflict(
                "idempotency key inserted concurrently".to_string(),
            )),
        }
    }
}
