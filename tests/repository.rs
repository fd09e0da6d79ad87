mod common;

use common::aged;
use common::user;
use common::Fixture;
use sea_orm::FromQueryResult;
use wt_cache::prelude::*;

wt_cache::query_descriptor! {
    #[derive(Debug, Default)]
    struct UserQuery {
        #[gq("eq")]
        id: i32,
        #[gq("like=name")]
        name_part: String,
        #[gq("gte=age")]
        younger_than: Option<i32>,
        #[gq(skip)]
        note: String,
    }
}

#[tokio::test]
async fn test_list_page() {
    let fx = Fixture::new().await;
    fx.seed((1..=30).map(|i| user(i, &format!("user{i}")))).await;
    let repository = fx.repository();
    let ctx = Context::background();

    let page = repository
        .list_page(&ctx, &ListPage::new(10, 5).ordered_by("id"), &())
        .await
        .unwrap();
    assert_eq!(page.total, 30);
    assert_eq!(page.data.iter().map(|u| u.id).collect::<Vec<_>>(), vec![11, 12, 13, 14, 15]);

    let page = repository
        .list_page(&ctx, &ListPage::new(0, 3).ordered_by("id desc"), &())
        .await
        .unwrap();
    assert_eq!(page.data.iter().map(|u| u.id).collect::<Vec<_>>(), vec![30, 29, 28]);

    // No pagination at all.
    let page = repository.list_page(&ctx, &ListPage::default(), &()).await.unwrap();
    assert_eq!((page.total, page.data.len()), (30, 30));
}

#[tokio::test]
async fn test_list_page_with_descriptor() {
    let fx = Fixture::new().await;
    fx.seed((1..=30).map(|i| aged(i, &format!("user{i}"), i))).await;
    let repository = fx.repository();
    let ctx = Context::background();

    // Names containing "2" are user2, user12 and user20..user29. Only four of them are 21 or younger.
    let query = UserQuery {
        name_part: "2".into(),
        younger_than: Some(21),
        note: "ignored".into(),
        ..Default::default()
    };
    let page = repository
        .list_page(&ctx, &ListPage::new(0, 2).ordered_by("age desc"), &query)
        .await
        .unwrap();
    assert_eq!(page.total, 4);
    assert_eq!(page.data.iter().map(|u| u.id).collect::<Vec<_>>(), vec![21, 20]);

    let rows = repository.all(&ctx, &query).await.unwrap();
    let mut ids = rows.iter().map(|u| u.id).collect::<Vec<_>>();
    ids.sort();
    assert_eq!(ids, vec![2, 12, 20, 21]);
}

#[tokio::test]
async fn test_descriptor_matches_listing() {
    let fx = Fixture::new().await;
    fx.seed((1..=12).map(|i| aged(i, &format!("user{i}"), i % 4))).await;
    let repository = fx.repository();
    let ctx = Context::background();

    let query = UserQuery {
        younger_than: Some(2),
        ..Default::default()
    };
    let total = repository.all(&ctx, &query).await.unwrap().len() as u64;
    let page = repository.list_page(&ctx, &ListPage::default(), &query).await.unwrap();
    assert_eq!(page.total, total);
    assert!(page.data.iter().all(|u| u.age <= 2));
}

#[tokio::test]
async fn test_bad_order_sends_nothing() {
    let fx = Fixture::new().await;
    let repository = fx.repository();
    let ctx = Context::background();

    for order in ["id; drop table users", "id sideways", "users.id"] {
        let err = repository
            .list_page(&ctx, &ListPage::new(0, 10).ordered_by(order), &())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)), "'{order}' gave {err:?}");
    }
    assert_eq!(fx.recorder.total(), 0);
}

#[tokio::test]
async fn test_find_in() {
    let fx = Fixture::new().await;
    fx.seed((1..=5).map(|i| user(i, &format!("user{i}")))).await;
    let repository = fx.repository();
    let ctx = Context::background();

    let mut ids = repository
        .find_in(&ctx, &[4, 2, 99])
        .await
        .unwrap()
        .iter()
        .map(|u| u.id)
        .collect::<Vec<_>>();
    ids.sort();
    assert_eq!(ids, vec![2, 4]);

    fx.recorder.reset();
    assert!(repository.find_in(&ctx, &[]).await.unwrap().is_empty());
    assert_eq!(fx.recorder.count(Statement::Find), 0);
}

#[tokio::test]
async fn test_batch_operations() {
    let fx = Fixture::new().await;
    let repository = fx.repository();
    let ctx = Context::background();

    assert_eq!(repository.batch_save(&ctx, vec![]).await.unwrap(), 0);
    assert_eq!(repository.batch_delete(&ctx, &[]).await.unwrap(), 0);
    assert_eq!(fx.recorder.total(), 0);

    let rows = repository
        .batch_save(&ctx, (1..=4).map(|i| user(i, &format!("user{i}"))).collect())
        .await
        .unwrap();
    assert_eq!(rows, 4);
    assert_eq!(fx.recorder.count(Statement::Begin), 1);
    assert_eq!(fx.recorder.count(Statement::Upsert), 4);
    assert_eq!(fx.recorder.count(Statement::Commit), 1);

    assert_eq!(repository.batch_delete(&ctx, &[1, 2, 77]).await.unwrap(), 2);
    let left = repository.all(&ctx, &()).await.unwrap();
    assert_eq!(left.iter().map(|u| u.id).collect::<Vec<_>>(), vec![3, 4]);
}

#[tokio::test]
async fn test_timestamps() {
    let fx = Fixture::new().await;
    let repository = fx.repository();
    let ctx = Context::background();
    let before = chrono::Utc::now().timestamp();

    repository.add(&ctx, user(1, "a")).await.unwrap();
    let added = repository.get(&ctx, &1).await.unwrap().unwrap();
    assert!(added.created_at >= before);
    assert_eq!(added.created_at, added.updated_at);

    // A given creation time is kept by save.
    repository
        .save(&ctx, user::Model {
            created_at: 1_000,
            ..user(2, "b")
        })
        .await
        .unwrap();
    let saved = repository.get(&ctx, &2).await.unwrap().unwrap();
    assert_eq!(saved.created_at, 1_000);
    assert!(saved.updated_at >= before);
}

#[derive(Debug, PartialEq, FromQueryResult)]
struct UserName {
    name: String,
}

#[tokio::test]
async fn test_get_select() {
    let fx = Fixture::new().await;
    fx.seed([aged(1, "a", 40)]).await;
    let repository = fx.repository();
    let ctx = Context::background();

    let got = repository
        .get_select::<UserName, _>(&ctx, &1, [user::Column::Name])
        .await
        .unwrap();
    assert_eq!(got, Some(UserName { name: "a".into() }));
    assert!(repository
        .get_select::<UserName, _>(&ctx, &2, [user::Column::Name])
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_get_missing_is_not_an_error() {
    let fx = Fixture::new().await;
    let repository = fx.repository();
    let ctx = Context::background();

    assert!(repository.get(&ctx, &1).await.unwrap().is_none());
    assert_eq!(repository.delete(&ctx, &1).await.unwrap(), 0);
    assert_eq!(repository.update(&ctx, user(1, "a")).await.unwrap(), 0);
}
