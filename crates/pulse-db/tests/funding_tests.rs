//! Deposit, payment webhook and withdrawal tests against PostgreSQL.

mod common;

use pulse_db::{DbError, FundingRepository, WalletRepository};
use pulse_models::{
    CreateDepositRequest, CreateWithdrawalRequest, DepositStatus, PaymentWebhookEvent, WebhookOutcome,
    WebhookResult, WithdrawalStatus,
};

fn webhook(provider_ref: &str, status: WebhookOutcome, amount: i64) -> PaymentWebhookEvent {
    PaymentWebhookEvent {
        provider_ref: provider_ref.to_string(),
        status,
        amount,
        failure_reason: None,
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_webhook_credits_once() {
    let db = common::connect().await;
    let user = common::new_user(&db).await;
    let funding = FundingRepository::new(db.clone());
    let wallets = WalletRepository::new(db.clone());

    let intent = funding
        .create_deposit(user.id, &CreateDepositRequest { amount: 250, provider: "stripe".into() })
        .await
        .unwrap();
    assert_eq!(intent.deposit.status, DepositStatus::Pending);

    let event = webhook(&intent.payment.provider_ref, WebhookOutcome::Succeeded, 250);
    assert_eq!(funding.process_webhook(&event).await.unwrap(), WebhookResult::Credited);
    assert_eq!(
        funding.process_webhook(&event).await.unwrap(),
        WebhookResult::AlreadyProcessed
    );

    let wallet = wallets.get_or_create(user.id).await.unwrap();
    assert_eq!(wallet.balance, 250);

    let contradicting = webhook(&intent.payment.provider_ref, WebhookOutcome::Failed, 250);
    assert!(matches!(
        funding.process_webhook(&contradicting).await.unwrap_err(),
        DbError::InvalidState(_)
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_webhook_amount_mismatch() {
    let db = common::connect().await;
    let user = common::new_user(&db).await;
    let funding = FundingRepository::new(db.clone());

    let intent = funding
        .create_deposit(user.id, &CreateDepositRequest { amount: 100, provider: "stripe".into() })
        .await
        .unwrap();
    let event = webhook(&intent.payment.provider_ref, WebhookOutcome::Succeeded, 99);
    assert!(matches!(
        funding.process_webhook(&event).await.unwrap_err(),
        DbError::Invalid(_)
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_cancelled_deposit_cannot_complete() {
    let db = common::connect().await;
    let user = common::new_user(&db).await;
    let funding = FundingRepository::new(db.clone());

    let intent = funding
        .create_deposit(user.id, &CreateDepositRequest { amount: 100, provider: "stripe".into() })
        .await
        .unwrap();
    let cancelled = funding.cancel_deposit(user.id, intent.deposit.id).await.unwrap();
    assert_eq!(cancelled.status, DepositStatus::Cancelled);

    let err = funding.complete_deposit(intent.deposit.id).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidState(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_withdrawal_hold_and_refund() {
    let db = common::connect().await;
    let user = common::new_user(&db).await;
    let admin = common::new_user(&db).await;
    common::fund(&db, user.id, 1_000).await;
    let funding = FundingRepository::new(db.clone());
    let wallets = WalletRepository::new(db.clone());

    let request = CreateWithdrawalRequest { amount: 400, destination: "acct_1".into() };
    let withdrawal = funding.request_withdrawal(user.id, &request).await.unwrap();
    let wallet = wallets.get_or_create(user.id).await.unwrap();
    assert_eq!((wallet.balance, wallet.held), (600, 400));

    let rejected = funding
        .reject_withdrawal(admin.id, withdrawal.id, "bad account")
        .await
        .unwrap();
    assert_eq!(rejected.status, WithdrawalStatus::Rejected);
    let wallet = wallets.get_or_create(user.id).await.unwrap();
    assert_eq!((wallet.balance, wallet.held), (1_000, 0));

    let again = funding.cancel_withdrawal(user.id, withdrawal.id).await.unwrap_err();
    assert!(matches!(again, DbError::InvalidState(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_withdrawal_completion_releases_hold() {
    let db = common::connect().await;
    let user = common::new_user(&db).await;
    let admin = common::new_user(&db).await;
    common::fund(&db, user.id, 500).await;
    let funding = FundingRepository::new(db.clone());
    let wallets = WalletRepository::new(db.clone());

    let request = CreateWithdrawalRequest { amount: 500, destination: "acct_2".into() };
    let withdrawal = funding.request_withdrawal(user.id, &request).await.unwrap();

    let early = funding.complete_withdrawal(admin.id, withdrawal.id).await.unwrap_err();
    assert!(matches!(early, DbError::InvalidState(_)));

    funding.approve_withdrawal(admin.id, withdrawal.id).await.unwrap();
    let done = funding.complete_withdrawal(admin.id, withdrawal.id).await.unwrap();
    assert_eq!(done.status, WithdrawalStatus::Completed);
    assert_eq!(done.reviewed_by, Some(admin.id));

    let wallet = wallets.get_or_create(user.id).await.unwrap();
    assert_eq!((wallet.balance, wallet.held), (0, 0));

    let overdraw = funding
        .request_withdrawal(user.id, &CreateWithdrawalRequest { amount: 1, destination: "acct_2".into() })
        .await
        .unwrap_err();
    assert!(matches!(overdraw, DbError::InsufficientFunds { .. }));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_cancel_racing_webhook_settles_once() {
    let db = common::connect().await;
    let funding = FundingRepository::new(db.clone());
    let wallets = WalletRepository::new(db.clone());

    for _ in 0..10 {
        let user = common::new_user(&db).await;
        let intent = funding
            .create_deposit(user.id, &CreateDepositRequest { amount: 75, provider: "stripe".into() })
            .await
            .unwrap();
        let event = webhook(&intent.payment.provider_ref, WebhookOutcome::Succeeded, 75);

        let (cancelled, credited) = tokio::join!(
            funding.cancel_deposit(user.id, intent.deposit.id),
            funding.process_webhook(&event),
        );

        let balance = wallets.get_or_create(user.id).await.unwrap().balance;
        match (cancelled, credited) {
            (Ok(deposit), Err(DbError::InvalidState(_))) => {
                assert_eq!(deposit.status, DepositStatus::Cancelled);
                assert_eq!(balance, 0);
            }
            (Err(DbError::InvalidState(_)), Ok(WebhookResult::Credited)) => {
                assert_eq!(balance, 75);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
