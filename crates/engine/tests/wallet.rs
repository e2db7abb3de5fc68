use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{Account, Engine, EngineError, Money, TopUpCmd, TransactionKind, TransferCmd, WithdrawCmd};
use migration::MigratorTrait;

async fn engine_without_bank() -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder().database(db.clone()).build().unwrap();
    (engine, db)
}

async fn engine_with_db() -> (Engine, DatabaseConnection) {
    let (engine, db) = engine_without_bank().await;
    engine
        .ensure_bank_account("PayBuddy Bank", "bank@paybuddy.local")
        .await
        .unwrap();
    (engine, db)
}

fn money(s: &str) -> Money {
    s.parse().unwrap()
}

async fn alice(engine: &Engine) -> Account {
    engine
        .create_account("alice", "alice@example.com", None, None)
        .await
        .unwrap()
}

async fn bob(engine: &Engine) -> Account {
    engine
        .create_account("bob", "bob@example.com", None, None)
        .await
        .unwrap()
}

#[tokio::test]
async fn top_up_credits_net_of_fee() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    let bank = engine.account_by_email("bank@paybuddy.local").await.unwrap();

    let tx = engine
        .top_up(TopUpCmd::new(alice.id, money("100.00")).idempotency_key("k1"))
        .await
        .unwrap();

    assert_eq!(tx.kind, TransactionKind::TopUp);
    assert_eq!(tx.sender_id, bank.id);
    assert_eq!(tx.receiver_id, alice.id);
    assert_eq!(tx.gross_amount, money("100.00"));
    assert_eq!(tx.fee_amount, money("0.50"));
    assert_eq!(tx.net_amount, money("99.50"));
    assert_eq!(tx.description.as_deref(), Some("Top up"));

    let balance = engine.get_balance(alice.id).await.unwrap();
    assert_eq!(balance, money("99.50"));
}

#[tokio::test]
async fn top_up_replay_returns_the_original_transaction() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;

    let first = engine
        .top_up(TopUpCmd::new(alice.id, money("100.00")).idempotency_key("same-key"))
        .await
        .unwrap();
    let second = engine
        .top_up(TopUpCmd::new(alice.id, money("100.00")).idempotency_key("same-key"))
        .await
        .unwrap();

    assert_eq!(first, second);
    // The credit was applied exactly once.
    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("99.50"));
    assert_eq!(engine.received_by(alice.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn withdrawal_debits_gross_plus_fee() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    engine
        .update_bank_details(alice.id, "FR7630006000011234567890189", "AGRIFRPP")
        .await
        .unwrap();
    engine
        .top_up(TopUpCmd::new(alice.id, money("100.00")))
        .await
        .unwrap();

    let tx = engine
        .withdraw_to_bank(WithdrawCmd::new(alice.id, money("50.00")))
        .await
        .unwrap();

    assert_eq!(tx.kind, TransactionKind::Withdrawal);
    assert_eq!(tx.sender_id, alice.id);
    assert_eq!(tx.gross_amount, money("50.00"));
    assert_eq!(tx.fee_amount, money("0.25"));
    // The full gross amount leaves towards the external bank.
    assert_eq!(tx.net_amount, money("50.00"));

    // 99.50 - (50.00 + 0.25)
    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("49.25"));
}

#[tokio::test]
async fn withdrawal_requires_registered_bank_details() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    engine
        .top_up(TopUpCmd::new(alice.id, money("100.00")))
        .await
        .unwrap();

    let err = engine
        .withdraw_to_bank(WithdrawCmd::new(alice.id, money("10.00")))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::MissingBankDetails);

    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("99.50"));
    assert_eq!(engine.sent_by(alice.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn transfer_moves_gross_and_charges_sender_the_fee() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    let bob = bob(&engine).await;
    engine
        .top_up(TopUpCmd::new(alice.id, money("200.00")))
        .await
        .unwrap();

    let tx = engine
        .transfer_p2p(TransferCmd::new(alice.id, bob.id, money("100.00")).description("Dinner"))
        .await
        .unwrap();

    assert_eq!(tx.kind, TransactionKind::P2pTransfer);
    assert_eq!(tx.gross_amount, money("100.00"));
    assert_eq!(tx.fee_amount, money("0.50"));
    assert_eq!(tx.net_amount, money("100.00"));
    assert_eq!(tx.description.as_deref(), Some("Dinner"));

    // 199.00 - (100.00 + 0.50)
    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("98.50"));
    assert_eq!(engine.get_balance(bob.id).await.unwrap(), money("100.00"));
}

#[tokio::test]
async fn transfer_defaults_description_to_receiver_email() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    let bob = bob(&engine).await;
    engine
        .top_up(TopUpCmd::new(alice.id, money("50.00")))
        .await
        .unwrap();

    let tx = engine
        .transfer_p2p(TransferCmd::new(alice.id, bob.id, money("10.00")))
        .await
        .unwrap();
    assert_eq!(tx.description.as_deref(), Some("Transfer to bob@example.com"));
}

#[tokio::test]
async fn insufficient_balance_rolls_the_whole_operation_back() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    let bob = bob(&engine).await;
    // net = 101.00 - 0.51 = 100.49, just below the 100.50 the transfer needs
    engine
        .top_up(TopUpCmd::new(alice.id, money("101.00")))
        .await
        .unwrap();

    let err = engine
        .transfer_p2p(TransferCmd::new(alice.id, bob.id, money("100.00")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance(_)));

    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("100.49"));
    assert_eq!(engine.get_balance(bob.id).await.unwrap(), Money::ZERO);
    assert_eq!(engine.sent_by(alice.id).await.unwrap().len(), 0);
}

#[tokio::test]
async fn transfer_to_self_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;

    let err = engine
        .transfer_p2p(TransferCmd::new(alice.id, alice.id, money("1.00")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidParticipants(_)));
}

#[tokio::test]
async fn bank_account_cannot_take_part_in_transfers() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    let bank = engine.account_by_email("bank@paybuddy.local").await.unwrap();
    engine
        .top_up(TopUpCmd::new(alice.id, money("50.00")))
        .await
        .unwrap();

    let err = engine
        .transfer_p2p(TransferCmd::new(alice.id, bank.id, money("10.00")))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::BankNotAllowed);

    let err = engine
        .transfer_p2p(TransferCmd::new(bank.id, alice.id, money("10.00")))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::BankNotAllowed);
}

#[tokio::test]
async fn operations_fail_cleanly_without_a_seeded_bank() {
    let (engine, _db) = engine_without_bank().await;
    let alice = alice(&engine).await;

    let err = engine
        .top_up(TopUpCmd::new(alice.id, money("10.00")))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Configuration(_)));
}

#[tokio::test]
async fn seeding_the_bank_twice_returns_the_same_account() {
    let (engine, _db) = engine_with_db().await;
    let first = engine.account_by_email("bank@paybuddy.local").await.unwrap();
    let second = engine
        .ensure_bank_account("PayBuddy Bank", "bank@paybuddy.local")
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let (engine, _db) = engine_with_db().await;
    alice(&engine).await;

    let err = engine
        .create_account("alice2", " Alice@Example.COM ", None, None)
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ExistingEmail("alice@example.com".to_string()));
}

#[tokio::test]
async fn amount_boundaries() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;

    // Smallest accepted amount; the fee rounds down to zero.
    let tx = engine
        .top_up(TopUpCmd::new(alice.id, money("0.01")))
        .await
        .unwrap();
    assert_eq!(tx.fee_amount, Money::ZERO);
    assert_eq!(tx.net_amount, money("0.01"));

    let err = engine
        .top_up(TopUpCmd::new(alice.id, Money::ZERO))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    // Amounts beyond the cap are rejected before any arithmetic.
    let err = engine
        .top_up(TopUpCmd::new(alice.id, Money::new(i64::MAX)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidAmount(_)));

    // Sub-cent input is rejected at parse time, not rounded up.
    assert!(matches!(
        "0.009".parse::<Money>(),
        Err(EngineError::InvalidAmount(_))
    ));
}

#[tokio::test]
async fn balance_writes_bump_the_account_version() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    assert_eq!(alice.version, 0);

    engine
        .top_up(TopUpCmd::new(alice.id, money("10.00")))
        .await
        .unwrap();
    engine
        .top_up(TopUpCmd::new(alice.id, money("10.00")))
        .await
        .unwrap();

    let reloaded = engine.account(alice.id).await.unwrap();
    assert_eq!(reloaded.version, 2);
}

#[tokio::test]
async fn listings_are_newest_first_and_split_by_direction() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    let bob = bob(&engine).await;
    engine
        .top_up(TopUpCmd::new(alice.id, money("100.00")))
        .await
        .unwrap();
    let t1 = engine
        .transfer_p2p(TransferCmd::new(alice.id, bob.id, money("10.00")))
        .await
        .unwrap();
    let t2 = engine
        .transfer_p2p(TransferCmd::new(alice.id, bob.id, money("20.00")))
        .await
        .unwrap();

    let sent = engine.sent_by(alice.id).await.unwrap();
    assert_eq!(sent.iter().map(|tx| tx.id).collect::<Vec<_>>(), vec![t2.id, t1.id]);

    let received = engine.received_by(bob.id).await.unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].id, t2.id);

    let looked_up = engine.transaction(t1.id).await.unwrap();
    assert_eq!(looked_up, t1);
    assert!(matches!(
        engine.transaction(999_999).await.unwrap_err(),
        EngineError::TransactionNotFound(_)
    ));
}

#[tokio::test]
async fn feed_paginates_with_an_opaque_cursor() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;
    let bob = bob(&engine).await;
    engine
        .top_up(TopUpCmd::new(alice.id, money("100.00")))
        .await
        .unwrap();
    engine
        .transfer_p2p(TransferCmd::new(alice.id, bob.id, money("10.00")))
        .await
        .unwrap();
    engine
        .transfer_p2p(TransferCmd::new(alice.id, bob.id, money("20.00")))
        .await
        .unwrap();

    let page1 = engine.feed_for(alice.id, 2, None).await.unwrap();
    assert_eq!(page1.items.len(), 2);
    let cursor = page1.next_cursor.expect("expected a second page");

    let page2 = engine
        .feed_for(alice.id, 2, Some(cursor.as_str()))
        .await
        .unwrap();
    assert_eq!(page2.items.len(), 1);
    assert!(page2.next_cursor.is_none());

    // Newest first across the whole feed, no duplicates between pages.
    let mut ids: Vec<i32> = page1.items.iter().chain(&page2.items).map(|tx| tx.id).collect();
    let feed_len = ids.len();
    ids.dedup();
    assert_eq!(ids.len(), feed_len);
    assert!(page1.items[0].created_at >= page2.items[0].created_at);

    assert!(matches!(
        engine.feed_for(alice.id, 2, Some("not-a-cursor")).await,
        Err(EngineError::InvalidCursor(_))
    ));
}

#[tokio::test]
async fn concurrent_top_ups_do_not_lose_updates() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;

    let (first, second) = tokio::join!(
        engine.top_up(TopUpCmd::new(alice.id, money("10.00"))),
        engine.top_up(TopUpCmd::new(alice.id, money("20.00"))),
    );
    first.unwrap();
    second.unwrap();

    // 9.95 + 19.90: both credits survived, neither overwrote the other.
    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("29.85"));
    assert_eq!(engine.account(alice.id).await.unwrap().version, 2);
}

#[tokio::test]
async fn concurrent_calls_sharing_a_key_credit_once() {
    let (engine, _db) = engine_with_db().await;
    let alice = alice(&engine).await;

    let (first, second) = tokio::join!(
        engine.top_up(TopUpCmd::new(alice.id, money("50.00")).idempotency_key("race-key")),
        engine.top_up(TopUpCmd::new(alice.id, money("50.00")).idempotency_key("race-key")),
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    // Whichever call lost the race got the winner's transaction back.
    assert_eq!(first, second);
    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("49.75"));
    assert_eq!(engine.received_by(alice.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stale_version_writes_touch_no_rows() {
    let (engine, db) = engine_with_db().await;
    let alice = alice(&engine).await;
    engine
        .top_up(TopUpCmd::new(alice.id, money("10.00")))
        .await
        .unwrap();

    // A writer still holding version 0 loses: the conditional update the
    // engine relies on matches nothing once the version has moved on.
    let backend = db.get_database_backend();
    let result = db
        .execute(Statement::from_sql_and_values(
            backend,
            "UPDATE accounts SET balance_minor = ?, version = version + 1 \
             WHERE id = ? AND version = ?",
            vec![0i64.into(), alice.id.into(), 0i64.into()],
        ))
        .await
        .unwrap();
    assert_eq!(result.rows_affected(), 0);

    assert_eq!(engine.get_balance(alice.id).await.unwrap(), money("9.95"));
}

#[tokio::test]
async fn unknown_accounts_are_reported() {
    let (engine, _db) = engine_with_db().await;

    assert!(matches!(
        engine.get_balance(42).await.unwrap_err(),
        EngineError::AccountNotFound(_)
    ));
    assert!(matches!(
        engine.top_up(TopUpCmd::new(42, money("1.00"))).await.unwrap_err(),
        EngineError::AccountNotFound(_)
    ));
}
