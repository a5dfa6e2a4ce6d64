//! Query building and bulk operations.

mod common;

use common::*;
use rowbound::sea_query::{Expr, ExprTrait, Order, Value};
use rowbound::{EntityData, Key, OrmError};

fn names(users: &[User]) -> Vec<String> {
    users.iter().map(|u| u.name().unwrap()).collect()
}

#[test]
fn test_count() {
    let em = manager();
    assert_eq!(em.query::<User>().count().unwrap(), 3);
    assert_eq!(em.query::<Article>().count().unwrap(), 4);
    assert_eq!(
        em.query::<Article>().where_eq("user_id", 1).count().unwrap(),
        3
    );
    assert_eq!(em.query::<User>().limit(1).count().unwrap(), 3);
}

#[test]
fn test_filter_and_order() {
    let em = manager();
    let users = em
        .query::<User>()
        .filter(Expr::col("age").gt(26))
        .order_by("age", Order::Desc)
        .all(&[])
        .unwrap();
    assert_eq!(names(&users), vec!["Olivia", "Emma"]);
}

#[test]
fn test_limit_and_offset() {
    let em = manager();
    let users = em
        .query::<User>()
        .order_by("age", Order::Desc)
        .limit(2)
        .offset(1)
        .all(&[])
        .unwrap();
    assert_eq!(names(&users), vec!["Emma", "Noah"]);

    let youngest = em
        .query::<User>()
        .order_by("age", Order::Asc)
        .get(&[])
        .unwrap()
        .unwrap();
    assert_eq!(youngest.name().unwrap(), "Noah");
}

#[test]
fn test_join() {
    let em = manager();
    let authors = em
        .query::<User>()
        .join(
            "articles",
            Expr::col(("articles", "user_id")).equals(("users", "id")),
        )
        .filter(Expr::col(("articles", "title")).eq("Noah writes"))
        .all(&[])
        .unwrap();
    assert_eq!(names(&authors), vec!["Noah"]);

    let titles: Vec<String> = em
        .query::<Article>()
        .order_by("title", Order::Asc)
        .all(&["title"])
        .unwrap()
        .iter()
        .map(|a| a.title().unwrap())
        .collect();
    assert_eq!(
        titles,
        vec!["Draft", "Hello, World!", "Noah writes", "Second thoughts"]
    );
}

#[test]
fn test_column_values() {
    let em = manager();
    let tags = em
        .query::<Tag>()
        .order_by("id", Order::Asc)
        .column("name")
        .unwrap();
    assert_eq!(
        tags,
        vec![Value::from("tag1"), Value::from("tag2"), Value::from("tag3")]
    );
}

#[test]
fn test_find_through_query() {
    let em = manager();
    let record = em
        .query::<CkRecord>()
        .find([("key1", 1), ("key2", 1)])
        .unwrap()
        .unwrap();
    assert_eq!(record.data().unwrap(), "k11");

    let records = em
        .query::<CkRecord>()
        .find_all([Key::tuple([1, 1]), Key::tuple([1, 2])])
        .unwrap();
    assert_eq!(records.len(), 2);

    let err = em.query::<CkRecord>().find(Key::tuple([1])).unwrap_err();
    assert!(matches!(err, OrmError::InvalidKey(_)));
    assert!(em.query::<User>().find(99).unwrap().is_none());
}

#[test]
fn test_find_all_without_keys_skips_database() {
    let em = manager();
    em.connection().log_queries(true);
    let users = em.query::<User>().find_all(Vec::<Key>::new()).unwrap();
    assert!(users.is_empty());
    assert!(logged_sql(&em).is_empty());
}

#[test]
fn test_bulk_update() {
    let em = manager();
    let affected = em
        .query::<User>()
        .filter(Expr::col("age").gt(26))
        .update([("age", 50)])
        .unwrap();
    assert_eq!(affected, 2);
    assert_eq!(em.query::<User>().where_eq("age", 50).count().unwrap(), 2);
    assert_eq!(em.find::<User>(2).unwrap().unwrap().age().unwrap(), 25);
}

#[test]
fn test_bulk_update_through_join() {
    let em = manager();
    let affected = em
        .query::<User>()
        .join(
            "profiles",
            Expr::col(("profiles", "user_id")).equals(("users", "id")),
        )
        .filter(Expr::col(("profiles", "city")).eq("Boston"))
        .update([("name", "Boston Noah")])
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(
        em.find::<User>(2).unwrap().unwrap().name().unwrap(),
        "Boston Noah"
    );
}

#[test]
fn test_bulk_update_rejects_primary_key() {
    let em = manager();
    let err = em.query::<User>().update([("id", 9)]).unwrap_err();
    assert!(matches!(err, OrmError::ImmutableKeyViolation(_)));
}

#[test]
fn test_bulk_update_touches_timestamps() {
    let em = manager();
    em.query::<Article>()
        .where_eq("user_id", 2)
        .update([("published", false)])
        .unwrap();
    let article = em.find::<Article>(ARTICLE_4).unwrap().unwrap();
    assert!(!article.published().unwrap());
    let updated: String = article.orm().get("updated_at").unwrap();
    assert_ne!(updated, "2024-01-04 10:00:00");
}

#[test]
fn test_increment_and_decrement() {
    let em = manager();
    em.query::<User>().where_eq("id", 2).increment("age", 5).unwrap();
    assert_eq!(em.find::<User>(2).unwrap().unwrap().age().unwrap(), 30);

    assert_eq!(em.query::<User>().decrement("age", 1).unwrap(), 3);
    let ages: Vec<Value> = em
        .query::<User>()
        .order_by("id", Order::Asc)
        .column("age")
        .unwrap();
    assert_eq!(ages, vec![Value::from(29i64), Value::from(29i64), Value::from(40i64)]);
}

#[test]
fn test_read_only_query_rejects_writes() {
    let em = manager();
    let err = em.query::<User>().read_only().update([("age", 1)]).unwrap_err();
    assert!(matches!(err, OrmError::ReadOnlyViolation(_)));
    let err = em.query::<User>().read_only().delete(true, &[]).unwrap_err();
    assert!(matches!(err, OrmError::ReadOnlyViolation(_)));
}

#[test]
fn test_bulk_delete() {
    let em = manager();
    assert_eq!(em.query::<User>().where_eq("id", 3).delete(false, &["users"]).unwrap(), 1);
    assert_eq!(em.query::<User>().count().unwrap(), 2);

    let err = em.query::<User>().delete(false, &["articles"]).unwrap_err();
    assert!(matches!(err, OrmError::Unsupported(_)));
}

#[test]
fn test_bulk_soft_delete() {
    let em = manager();
    let affected = em
        .query::<Article>()
        .where_eq("published", false)
        .delete(false, &[])
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(em.query::<Article>().count().unwrap(), 3);
    assert_eq!(em.query::<Article>().only_soft_deleted().count().unwrap(), 1);
    assert_eq!(em.query::<Article>().with_soft_deleted().count().unwrap(), 4);

    // Pivot rows still reference user 1's first article
    let unlinked = em
        .connection()
        .execute_unprepared(&format!(
            "DELETE FROM articles_tags WHERE article_id = '{ARTICLE_1}'"
        ))
        .unwrap();
    assert_eq!(unlinked, 2);

    let purged = em
        .query::<Article>()
        .with_soft_deleted()
        .where_eq("user_id", 1)
        .delete(true, &["articles"])
        .unwrap();
    assert_eq!(purged, 3);
    assert_eq!(em.query::<Article>().with_soft_deleted().count().unwrap(), 1);
}

#[test]
fn test_joined_delete_needs_single_key() {
    let em = manager();
    let err = em
        .query::<CkRecord>()
        .join(
            "ck_related",
            Expr::col(("ck_related", "ck_record_key1")).equals(("ck_records", "key1")),
        )
        .delete(true, &[])
        .unwrap_err();
    assert!(matches!(err, OrmError::Unsupported(_)));
}
