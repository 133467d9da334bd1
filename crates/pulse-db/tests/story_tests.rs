//! Story view tests against PostgreSQL.

mod common;

use pulse_db::{Database, DbError, StoryRepository};
use pulse_models::{CreateStoryRequest, MediaType, Story, User};

async fn post_story(stories: &StoryRepository, author: &User) -> Story {
    stories
        .create(
            author.id,
            &CreateStoryRequest {
                media_url: "https://cdn.example.com/s/1.jpg".into(),
                media_type: MediaType::Image,
                caption: Some("  sunset ".into()),
            },
        )
        .await
        .expect("Failed to post story")
}

async fn expire(db: &Database, story: &Story) {
    sqlx::query("UPDATE stories SET expires_at = clock_timestamp() - interval '1 minute' WHERE id = $1")
        .bind(story.id)
        .execute(db.pool())
        .await
        .expect("Failed to expire story");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_only_first_view_counts() {
    let db = common::connect().await;
    let author = common::new_user(&db).await;
    let viewer = common::new_user(&db).await;
    let stories = StoryRepository::new(db.clone(), 24);
    let story = post_story(&stories, &author).await;
    assert_eq!(story.caption.as_deref(), Some("sunset"));

    assert_eq!(stories.view(viewer.id, story.id).await.unwrap().view_count, 1);
    assert_eq!(stories.view(viewer.id, story.id).await.unwrap().view_count, 1);

    let viewers = stories.viewers(author.id, story.id).await.unwrap();
    assert_eq!(viewers.len(), 1);
    assert_eq!(viewers[0].viewer_id, viewer.id);

    let err = stories.viewers(viewer.id, story.id).await.unwrap_err();
    assert!(matches!(err, DbError::Forbidden(_)));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_author_view_is_not_counted() {
    let db = common::connect().await;
    let author = common::new_user(&db).await;
    let stories = StoryRepository::new(db.clone(), 24);
    let story = post_story(&stories, &author).await;

    assert_eq!(stories.view(author.id, story.id).await.unwrap().view_count, 0);
    assert!(stories.viewers(author.id, story.id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_expired_story_is_not_found() {
    let db = common::connect().await;
    let author = common::new_user(&db).await;
    let viewer = common::new_user(&db).await;
    let stories = StoryRepository::new(db.clone(), 24);
    let story = post_story(&stories, &author).await;
    expire(&db, &story).await;

    assert!(matches!(stories.get(story.id).await.unwrap_err(), DbError::NotFound(_)));
    assert!(matches!(stories.view(viewer.id, story.id).await.unwrap_err(), DbError::NotFound(_)));
    assert!(stories.list_by_author(author.id).await.unwrap().is_empty());
    assert!(stories.feed(author.id).await.unwrap().is_empty());
}
