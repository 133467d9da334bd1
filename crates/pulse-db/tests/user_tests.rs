//! Follow graph tests against PostgreSQL.

mod common;

use pulse_db::{DbError, UserRepository};
use pulse_models::PageQuery;
use uuid::Uuid;

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_follow_and_unfollow_are_idempotent() {
    let db = common::connect().await;
    let alice = common::new_user(&db).await;
    let bob = common::new_user(&db).await;
    let users = UserRepository::new(db.clone());

    let first = users.follow(alice.id, bob.id).await.unwrap();
    assert!(first.following && first.changed);
    assert_eq!(first.follower_count, 1);

    let again = users.follow(alice.id, bob.id).await.unwrap();
    assert!(again.following && !again.changed);
    assert_eq!(again.follower_count, 1);
    assert!(users.is_following(alice.id, bob.id).await.unwrap());

    let gone = users.unfollow(alice.id, bob.id).await.unwrap();
    assert!(!gone.following && gone.changed);
    assert_eq!(gone.follower_count, 0);

    let noop = users.unfollow(alice.id, bob.id).await.unwrap();
    assert!(!noop.changed);
    assert_eq!(noop.follower_count, 0);

    assert_eq!(users.get(alice.id).await.unwrap().following_count, 0);
    assert_eq!(users.get(bob.id).await.unwrap().follower_count, 0);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_follow_counters_match_rows() {
    let db = common::connect().await;
    let star = common::new_user(&db).await;
    let users = UserRepository::new(db.clone());

    let mut fans = Vec::new();
    for _ in 0..3 {
        let fan = common::new_user(&db).await;
        users.follow(fan.id, star.id).await.unwrap();
        fans.push(fan);
    }
    users.follow(star.id, fans[0].id).await.unwrap();
    users.unfollow(fans[1].id, star.id).await.unwrap();

    let star = users.get(star.id).await.unwrap();
    let followers = users.followers(star.id, &PageQuery::default()).await.unwrap();
    let following = users.following(star.id, &PageQuery::default()).await.unwrap();
    assert_eq!(star.follower_count, 2);
    assert_eq!(followers.len(), 2);
    assert_eq!(star.following_count, 1);
    assert_eq!(following.len(), 1);
    assert_eq!(users.get(fans[0].id).await.unwrap().follower_count, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_mutual_follows_do_not_deadlock() {
    let db = common::connect().await;
    let alice = common::new_user(&db).await;
    let bob = common::new_user(&db).await;
    let users = UserRepository::new(db.clone());

    for _ in 0..20 {
        let (ab, ba) = tokio::join!(users.follow(alice.id, bob.id), users.follow(bob.id, alice.id));
        ab.expect("alice -> bob");
        ba.expect("bob -> alice");

        let (ab, ba) = tokio::join!(users.unfollow(alice.id, bob.id), users.unfollow(bob.id, alice.id));
        ab.expect("alice -/-> bob");
        ba.expect("bob -/-> alice");
    }

    for user in [alice.id, bob.id] {
        let user = users.get(user).await.unwrap();
        assert_eq!((user.follower_count, user.following_count), (0, 0));
    }
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_follow_rejects_self_and_unknown_users() {
    let db = common::connect().await;
    let alice = common::new_user(&db).await;
    let users = UserRepository::new(db.clone());

    let own = users.follow(alice.id, alice.id).await.unwrap_err();
    assert!(matches!(own, DbError::Invalid(_)));

    let missing = users.follow(alice.id, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(missing, DbError::NotFound(_)));
    assert_eq!(users.get(alice.id).await.unwrap().following_count, 0);
}
