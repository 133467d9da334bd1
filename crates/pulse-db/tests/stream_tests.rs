//! Stream comment tests against PostgreSQL.

mod common;

use pulse_db::{CommentModerator, Database, DbError, StreamRepository};
use pulse_models::{CreateStreamRequest, PageQuery, Stream, User};

async fn new_stream(db: &Database, owner: &User) -> Stream {
    StreamRepository::new(db.clone())
        .create(
            owner.id,
            &CreateStreamRequest {
                title: "late night coding".into(),
                description: None,
                category: Some("tech".into()),
                tags: vec!["rust".into()],
            },
        )
        .await
        .expect("Failed to create stream")
}

fn as_user(user: &User) -> CommentModerator {
    CommentModerator { user_id: user.id, can_moderate: false }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_replies_are_one_level_deep() {
    let db = common::connect().await;
    let owner = common::new_user(&db).await;
    let viewer = common::new_user(&db).await;
    let stream = new_stream(&db, &owner).await;
    let streams = StreamRepository::new(db.clone());

    let top = streams.create_comment(viewer.id, stream.id, "first!", None).await.unwrap();
    let reply = streams
        .create_comment(owner.id, stream.id, "welcome", Some(top.id))
        .await
        .unwrap();
    assert_eq!(reply.parent_id, Some(top.id));
    assert_eq!(streams.get_comment(top.id).await.unwrap().reply_count, 1);

    let nested = streams
        .create_comment(viewer.id, stream.id, "thanks", Some(reply.id))
        .await
        .unwrap_err();
    assert!(matches!(nested, DbError::Invalid(_)));

    let other = new_stream(&db, &owner).await;
    let cross = streams
        .create_comment(viewer.id, other.id, "wrong room", Some(top.id))
        .await
        .unwrap_err();
    assert!(matches!(cross, DbError::Invalid(_)));

    let listed = streams.list_comments(stream.id, &PageQuery::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, top.id);
    let replies = streams.replies(top.id).await.unwrap();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].id, reply.id);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deleted_comment_is_masked() {
    let db = common::connect().await;
    let owner = common::new_user(&db).await;
    let viewer = common::new_user(&db).await;
    let stream = new_stream(&db, &owner).await;
    let streams = StreamRepository::new(db.clone());

    let comment = streams
        .create_comment(viewer.id, stream.id, "something rude", None)
        .await
        .unwrap();
    let deleted = streams.delete_comment(as_user(&viewer), comment.id).await.unwrap();
    assert!(deleted.is_deleted);
    assert!(deleted.body.is_empty());

    let listed = streams.list_comments(stream.id, &PageQuery::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_deleted);
    assert!(listed[0].body.is_empty());

    let reply = streams
        .create_comment(owner.id, stream.id, "too late", Some(comment.id))
        .await
        .unwrap_err();
    assert!(matches!(reply, DbError::InvalidState(_)));

    let edit = streams.edit_comment(viewer.id, comment.id, "nicer now").await.unwrap_err();
    assert!(matches!(edit, DbError::InvalidState(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_delete_permissions() {
    let db = common::connect().await;
    let owner = common::new_user(&db).await;
    let author = common::new_user(&db).await;
    let stranger = common::new_user(&db).await;
    let stream = new_stream(&db, &owner).await;
    let streams = StreamRepository::new(db.clone());

    let by_author = streams.create_comment(author.id, stream.id, "one", None).await.unwrap();
    let by_owner = streams.create_comment(author.id, stream.id, "two", None).await.unwrap();
    let by_staff = streams.create_comment(author.id, stream.id, "three", None).await.unwrap();

    let denied = streams.delete_comment(as_user(&stranger), by_author.id).await.unwrap_err();
    assert!(matches!(denied, DbError::Forbidden(_)));
    assert!(!streams.get_comment(by_author.id).await.unwrap().is_deleted);

    assert!(streams.delete_comment(as_user(&author), by_author.id).await.unwrap().is_deleted);
    assert!(streams.delete_comment(as_user(&owner), by_owner.id).await.unwrap().is_deleted);
    let staff = CommentModerator { user_id: stranger.id, can_moderate: true };
    assert!(streams.delete_comment(staff, by_staff.id).await.unwrap().is_deleted);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_deleting_twice_still_checks_permission() {
    let db = common::connect().await;
    let owner = common::new_user(&db).await;
    let author = common::new_user(&db).await;
    let stranger = common::new_user(&db).await;
    let stream = new_stream(&db, &owner).await;
    let streams = StreamRepository::new(db.clone());

    let comment = streams.create_comment(author.id, stream.id, "bye", None).await.unwrap();
    streams.delete_comment(as_user(&author), comment.id).await.unwrap();

    let again = streams.delete_comment(as_user(&author), comment.id).await.unwrap();
    assert!(again.is_deleted);

    let denied = streams.delete_comment(as_user(&stranger), comment.id).await.unwrap_err();
    assert!(matches!(denied, DbError::Forbidden(_)));
}
