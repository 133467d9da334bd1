//! Reaction tests against PostgreSQL.

mod common;

use pulse_db::{DbError, ReactionRepository, StreamRepository};
use pulse_models::{CreateStreamRequest, ReactionKind, ReactionTarget};
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_react_replaces_kind_and_unreact_is_idempotent() {
    let db = common::connect().await;
    let owner = common::new_user(&db).await;
    let fan = common::new_user(&db).await;
    let other = common::new_user(&db).await;
    let stream = StreamRepository::new(db.clone())
        .create(
            owner.id,
            &CreateStreamRequest {
                title: "speedrun".into(),
                description: None,
                category: None,
                tags: Vec::new(),
            },
        )
        .await
        .unwrap();
    let reactions = ReactionRepository::new(db.clone());

    let liked = reactions
        .react(fan.id, ReactionTarget::Stream, stream.id, ReactionKind::Like)
        .await
        .unwrap();
    assert_eq!(liked.total, 1);
    assert_eq!(liked.mine, Some(ReactionKind::Like));

    let loved = reactions
        .react(fan.id, ReactionTarget::Stream, stream.id, ReactionKind::Love)
        .await
        .unwrap();
    assert_eq!(loved.total, 1);
    assert_eq!(loved.mine, Some(ReactionKind::Love));
    assert_eq!(loved.counts.get(&ReactionKind::Love), Some(&1));
    assert_eq!(loved.counts.get(&ReactionKind::Like).copied().unwrap_or(0), 0);

    reactions
        .react(other.id, ReactionTarget::Stream, stream.id, ReactionKind::Love)
        .await
        .unwrap();
    let anonymous = reactions.summary(None, ReactionTarget::Stream, stream.id).await.unwrap();
    assert_eq!(anonymous.total, 2);
    assert_eq!(anonymous.mine, None);

    let removed = reactions.unreact(fan.id, ReactionTarget::Stream, stream.id).await.unwrap();
    assert_eq!(removed.total, 1);
    assert_eq!(removed.mine, None);
    let again = reactions.unreact(fan.id, ReactionTarget::Stream, stream.id).await.unwrap();
    assert_eq!(again.total, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_react_to_missing_target() {
    let db = common::connect().await;
    let fan = common::new_user(&db).await;
    let reactions = ReactionRepository::new(db.clone());

    let err = reactions
        .react(fan.id, ReactionTarget::Story, Uuid::new_v4(), ReactionKind::Wow)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}
