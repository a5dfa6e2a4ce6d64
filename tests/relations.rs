//! Relation loading: has-one, has-many, belongs-to, share-one, share-many,
//! composite keys, caching and eager loading.

mod common;

use common::*;
use rowbound::{Entity, EntityData, Key, OrmError, RelationState};

#[test]
fn test_has_one() {
    let em = manager();
    let user = em.find::<User>(1).unwrap().unwrap();
    let profile = user.profile().unwrap().unwrap();
    assert_eq!(profile.city().unwrap(), "New York");

    let olivia = em.find::<User>(3).unwrap().unwrap();
    assert!(olivia.profile().unwrap().is_none());
}

#[test]
fn test_has_many() {
    let em = manager();
    let user = em.find::<User>(1).unwrap().unwrap();
    let articles = user.articles().unwrap();
    assert_eq!(articles.len(), 3);
    assert_eq!(articles[0].title().unwrap(), "Hello, World!");
}

#[test]
fn test_has_many_composite() {
    let em = manager();
    let record = em
        .find::<CkRecord>([("key1", 1), ("key2", 1)])
        .unwrap()
        .unwrap();
    let related = record.ck_related().unwrap();
    assert_eq!(related.len(), 2);
    let ids: Vec<i64> = related.iter().map(|r| r.id().unwrap()).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[test]
fn test_has_many_use_unprefixed() {
    let em = manager();
    let user = em.find::<User>(1).unwrap().unwrap();
    assert_eq!(user.articles().unwrap().len(), 3);
    assert_eq!(user.published_articles(false).unwrap().len(), 3);
    assert_eq!(user.unpublished_articles(false).unwrap().len(), 3);
}

#[test]
fn test_has_many_use_prefixed() {
    let em = manager();
    let user = em.find::<User>(1).unwrap().unwrap();
    assert_eq!(user.articles().unwrap().len(), 3);
    assert_eq!(user.published_articles(true).unwrap().len(), 2);
    assert_eq!(user.unpublished_articles(true).unwrap().len(), 1);
}

#[test]
fn test_belongs_to() {
    let em = manager();
    let article = em.find::<Article>(ARTICLE_1).unwrap().unwrap();
    let author = article.author().unwrap().unwrap();
    assert_eq!(author.name().unwrap(), "Emma");
}

#[test]
fn test_belongs_to_composite() {
    let em = manager();
    let related = em.find::<CkRelated>(3).unwrap().unwrap();
    let record = related.record().unwrap().unwrap();
    assert_eq!(record.data().unwrap(), "k12");
}

#[test]
fn test_share_one() {
    let em = manager();
    let article = em.find::<Article>(ARTICLE_1).unwrap().unwrap();
    let tag = article.first_tag().unwrap().unwrap();
    assert_eq!(tag.name().unwrap(), "tag1");

    let untagged = em.find::<Article>(ARTICLE_2).unwrap().unwrap();
    assert!(untagged.first_tag().unwrap().is_none());
}

#[test]
fn test_share_many() {
    let em = manager();
    let article = em.find::<Article>(ARTICLE_1).unwrap().unwrap();
    let names: Vec<String> = article
        .tags()
        .unwrap()
        .iter()
        .map(|tag| tag.name().unwrap())
        .collect();
    assert_eq!(names, vec!["tag1", "tag2"]);
}

#[test]
fn test_share_many_reverse_side() {
    let em = manager();
    let tag = em.find::<Tag>(3).unwrap().unwrap();
    let articles = tag.articles().unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].id().unwrap(), ARTICLE_4);
}

#[test]
fn test_relation_loaded_once() {
    let em = manager();
    let user = em.find::<User>(1).unwrap().unwrap();
    assert_eq!(user.orm().relation_state("articles"), RelationState::Unloaded);

    em.connection().log_queries(true);
    assert_eq!(user.articles().unwrap().len(), 3);
    assert_eq!(user.articles().unwrap().len(), 3);
    assert_eq!(logged_sql(&em).len(), 1);
    assert_eq!(user.orm().relation_state("articles"), RelationState::Loaded);
}

#[test]
fn test_relation_skips_soft_deleted_rows() {
    let em = manager();
    let mut draft = em.find::<Article>(ARTICLE_3).unwrap().unwrap();
    draft.delete(false).unwrap();

    let user = em.find::<User>(1).unwrap().unwrap();
    assert_eq!(user.articles().unwrap().len(), 2);
}

#[test]
fn test_relation_type_mismatch() {
    let em = manager();
    let user = em.find::<User>(1).unwrap().unwrap();
    let err = user.orm().related_many::<Tag>("articles").unwrap_err();
    assert!(matches!(err, OrmError::Relation(_)));

    let err = user.orm().related_one::<Article>("articles").unwrap_err();
    assert!(matches!(err, OrmError::Relation(_)));

    let err = user.orm().related_many::<Article>("comments").unwrap_err();
    assert!(matches!(err, OrmError::UnknownColumn(_)));
}

#[test]
fn test_eager_has_many() {
    let em = manager();
    em.connection().log_queries(true);
    let users = em
        .query::<User>()
        .with(["articles", "profile"])
        .all(&[])
        .unwrap();
    assert_eq!(users.len(), 3);
    assert_eq!(logged_sql(&em).len(), 3);

    let counts: Vec<usize> = users.iter().map(|u| u.articles().unwrap().len()).collect();
    assert_eq!(counts, vec![3, 1, 0]);
    let cities: Vec<Option<String>> = users
        .iter()
        .map(|u| u.profile().unwrap().map(|p| p.city().unwrap()))
        .collect();
    assert_eq!(
        cities,
        vec![Some("New York".to_string()), Some("Boston".to_string()), None]
    );
    assert_eq!(logged_sql(&em).len(), 3);
}

#[test]
fn test_eager_share_many() {
    let em = manager();
    let articles = em.query::<Article>().with(["tags"]).all(&[]).unwrap();
    em.connection().log_queries(true);

    let tags: Vec<Vec<String>> = articles
        .iter()
        .map(|a| a.tags().unwrap().iter().map(|t| t.name().unwrap()).collect())
        .collect();
    assert_eq!(
        tags,
        vec![
            vec!["tag1".to_string(), "tag2".to_string()],
            vec![],
            vec![],
            vec!["tag3".to_string()],
        ]
    );
    assert!(logged_sql(&em).is_empty());
}

#[test]
fn test_eager_belongs_to_composite() {
    let em = manager();
    let related = em.query::<CkRelated>().with(["record"]).all(&[]).unwrap();
    em.connection().log_queries(true);
    let data: Vec<String> = related
        .iter()
        .map(|r| r.record().unwrap().unwrap().data().unwrap())
        .collect();
    assert_eq!(data, vec!["k11", "k11", "k12", "k21"]);
    assert!(logged_sql(&em).is_empty());
}

#[test]
fn test_eager_unknown_relation() {
    let em = manager();
    let err = em.query::<User>().with(["comments"]).all(&[]).unwrap_err();
    assert!(matches!(err, OrmError::UnknownColumn(_)));
}

#[test]
fn test_link_and_unlink() {
    let em = manager();
    let mut article = em.find::<Article>(ARTICLE_2).unwrap().unwrap();
    let tag = em.find::<Tag>(3).unwrap().unwrap();
    assert!(article.tags().unwrap().is_empty());

    article.orm_mut().link("tags", &tag).unwrap();
    let names: Vec<String> = article.tags().unwrap().iter().map(|t| t.name().unwrap()).collect();
    assert_eq!(names, vec!["tag3"]);

    article.orm_mut().unlink("tags", &tag).unwrap();
    assert!(article.tags().unwrap().is_empty());
}

#[test]
fn test_link_requires_pivot() {
    let em = manager();
    let mut user = em.find::<User>(1).unwrap().unwrap();
    let article = em.find::<Article>(ARTICLE_4).unwrap().unwrap();
    let err = user.orm_mut().link("articles", &article).unwrap_err();
    assert!(matches!(err, OrmError::Unsupported(_)));
}

#[test]
fn test_set_related() {
    let em = manager();
    let mut profile = em.find::<Profile>(2).unwrap().unwrap();
    let olivia = em.find::<User>(3).unwrap().unwrap();

    profile.orm_mut().set_related("user", Some(&olivia)).unwrap();
    assert_eq!(profile.user_id().unwrap(), Some(3));
    assert_eq!(profile.user().unwrap().unwrap().name().unwrap(), "Olivia");
    assert!(profile.save().unwrap());

    let reloaded = em.find::<Profile>(2).unwrap().unwrap();
    assert_eq!(reloaded.user().unwrap().unwrap().name().unwrap(), "Olivia");

    profile.orm_mut().set_related::<User>("user", None).unwrap();
    profile.save().unwrap();
    let reloaded = em.find::<Profile>(Key::from(2)).unwrap().unwrap();
    assert!(reloaded.user().unwrap().is_none());
}

#[test]
fn test_foreign_key_change_invalidates_belongs_to() {
    let em = manager();
    let mut profile = em.find::<Profile>(1).unwrap().unwrap();
    assert_eq!(profile.user().unwrap().unwrap().name().unwrap(), "Emma");

    profile.set_user_id(Some(2)).unwrap();
    assert_eq!(profile.user().unwrap().unwrap().name().unwrap(), "Noah");
}

#[test]
fn test_set_related_rejects_collections() {
    let em = manager();
    let mut user = em.find::<User>(1).unwrap().unwrap();
    let profile = em.find::<Profile>(2).unwrap().unwrap();
    let err = user.orm_mut().set_related("profile", Some(&profile)).unwrap_err();
    assert!(matches!(err, OrmError::Unsupported(_)));
}
