//! Shared fixtures for the integration tests
//!
//! Every test gets its own in-memory SQLite database with this data:
//!
//! - users: 1 Emma (30), 2 Noah (25), 3 Olivia (41)
//! - profiles: Emma in New York, Noah in Boston
//! - articles: Emma wrote three (two published), Noah one
//! - tags: tag1, tag2, tag3; article 1 has tag1 and tag2, article 4 has tag3
//! - ck_records / ck_related: composite-key records and rows pointing at them

#![allow(dead_code)]

use rowbound::{
    qualified_name, Connection, DataMapper, Entity, EntityData, EntityManager, EntityMapper,
    OrmError,
};

pub const ARTICLE_1: &str = "00000000000000000000000000000001";
pub const ARTICLE_2: &str = "00000000000000000000000000000002";
pub const ARTICLE_3: &str = "00000000000000000000000000000003";
pub const ARTICLE_4: &str = "00000000000000000000000000000004";

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        age INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE TABLE profiles (
        id INTEGER PRIMARY KEY,
        user_id INTEGER REFERENCES users (id),
        city TEXT NOT NULL
    )",
    "CREATE TABLE articles (
        id TEXT PRIMARY KEY,
        user_id INTEGER NOT NULL REFERENCES users (id),
        title TEXT NOT NULL,
        content TEXT,
        published INTEGER NOT NULL DEFAULT 0,
        created_at TEXT,
        updated_at TEXT,
        deleted_at TEXT
    )",
    "CREATE TABLE tags (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    )",
    "CREATE TABLE articles_tags (
        article_id TEXT NOT NULL REFERENCES articles (id),
        tag_id INTEGER NOT NULL REFERENCES tags (id),
        PRIMARY KEY (article_id, tag_id)
    )",
    "CREATE TABLE ck_records (
        key1 INTEGER NOT NULL,
        key2 INTEGER NOT NULL,
        data TEXT NOT NULL,
        PRIMARY KEY (key1, key2)
    )",
    "CREATE TABLE ck_related (
        id INTEGER PRIMARY KEY,
        ck_record_key1 INTEGER NOT NULL,
        ck_record_key2 INTEGER NOT NULL,
        FOREIGN KEY (ck_record_key1, ck_record_key2) REFERENCES ck_records (key1, key2)
    )",
];

const FIXTURES: &[&str] = &[
    "INSERT INTO users (id, name, age) VALUES (1, 'Emma', 30), (2, 'Noah', 25), (3, 'Olivia', 41)",
    "INSERT INTO profiles (id, user_id, city) VALUES (1, 1, 'New York'), (2, 2, 'Boston')",
    "INSERT INTO articles (id, user_id, title, content, published, created_at, updated_at) VALUES
        ('00000000000000000000000000000001', 1, 'Hello, World!', 'First post', 1, '2024-01-01 10:00:00', '2024-01-01 10:00:00'),
        ('00000000000000000000000000000002', 1, 'Second thoughts', NULL, 1, '2024-01-02 10:00:00', '2024-01-02 10:00:00'),
        ('00000000000000000000000000000003', 1, 'Draft', NULL, 0, '2024-01-03 10:00:00', '2024-01-03 10:00:00'),
        ('00000000000000000000000000000004', 2, 'Noah writes', 'Hi', 1, '2024-01-04 10:00:00', '2024-01-04 10:00:00')",
    "INSERT INTO tags (id, name) VALUES (1, 'tag1'), (2, 'tag2'), (3, 'tag3')",
    "INSERT INTO articles_tags (article_id, tag_id) VALUES
        ('00000000000000000000000000000001', 1),
        ('00000000000000000000000000000001', 2),
        ('00000000000000000000000000000004', 3)",
    "INSERT INTO ck_records (key1, key2, data) VALUES (1, 1, 'k11'), (1, 2, 'k12'), (2, 1, 'k21')",
    "INSERT INTO ck_related (id, ck_record_key1, ck_record_key2) VALUES (1, 1, 1), (2, 1, 1), (3, 1, 2), (4, 2, 1)",
];

/// Create the tables and load the fixture rows
pub fn seed(connection: &Connection) {
    for statement in SCHEMA.iter().chain(FIXTURES) {
        connection
            .execute_unprepared(statement)
            .expect("load fixtures");
    }
}

/// Fresh in-memory database with schema and fixtures
pub fn manager() -> EntityManager {
    let connection = Connection::sqlite_in_memory().expect("open in-memory database");
    seed(&connection);
    EntityManager::new(connection)
}

/// SQL of every logged statement
pub fn logged_sql(em: &EntityManager) -> Vec<String> {
    em.connection()
        .query_log()
        .into_iter()
        .map(|query| query.sql)
        .collect()
}

#[derive(Debug, EntityData)]
#[columns(id: i64, name: String, age: i64)]
#[relations(profile: Profile, articles: [Article])]
pub struct User {
    #[orm]
    orm: DataMapper,
}

impl Entity for User {
    fn map_entity(mapper: &mut EntityMapper) {
        mapper.relation("profile").has_one::<Profile>();
        mapper.relation("articles").has_many::<Article>();
        mapper
            .relation("published_articles")
            .has_many::<Article>()
            .where_eq("published", true);
        mapper
            .relation("unpublished_articles")
            .has_many::<Article>()
            .where_eq("published", false);
    }
}

impl User {
    pub fn published_articles(&self, prefixed: bool) -> Result<Vec<Article>, OrmError> {
        self.orm()
            .related_many(&qualified_name("published", "articles", prefixed))
    }

    pub fn unpublished_articles(&self, prefixed: bool) -> Result<Vec<Article>, OrmError> {
        self.orm()
            .related_many(&qualified_name("unpublished", "articles", prefixed))
    }
}

#[derive(Debug, EntityData)]
#[columns(id: i64, user_id: Option<i64>, city: String)]
#[relations(user: User)]
pub struct Profile {
    #[orm]
    orm: DataMapper,
}

impl Entity for Profile {
    fn map_entity(mapper: &mut EntityMapper) {
        mapper.relation("user").belongs_to::<User>();
    }
}

#[derive(Debug, EntityData)]
#[columns(id: String, user_id: i64, title: String, content: Option<String>, published: bool)]
#[relations(author: User, tags: [Tag], first_tag: Tag)]
pub struct Article {
    #[orm]
    orm: DataMapper,
}

impl Entity for Article {
    fn map_entity(mapper: &mut EntityMapper) {
        mapper.soft_delete(true).timestamps(true);
        mapper
            .relation("author")
            .belongs_to::<User>()
            .foreign_key("user_id");
        mapper
            .relation("tags")
            .share_many::<Tag>()
            .pivot("articles_tags");
        mapper
            .relation("first_tag")
            .share_one::<Tag>()
            .pivot("articles_tags");
    }
}

#[derive(Debug, EntityData)]
#[columns(id: i64, name: String)]
#[relations(articles: [Article])]
pub struct Tag {
    #[orm]
    orm: DataMapper,
}

impl Entity for Tag {
    fn map_entity(mapper: &mut EntityMapper) {
        mapper
            .relation("articles")
            .share_many::<Article>()
            .pivot("articles_tags")
            .pivot_keys("tag_id", "article_id");
    }
}

#[derive(Debug, EntityData)]
#[columns(key1: i64, key2: i64, data: String)]
#[relations(ck_related: [CkRelated])]
pub struct CkRecord {
    #[orm]
    orm: DataMapper,
}

impl Entity for CkRecord {
    fn map_entity(mapper: &mut EntityMapper) {
        mapper.primary_keys(["key1", "key2"]);
        mapper.relation("ck_related").has_many::<CkRelated>();
    }
}

#[derive(Debug, EntityData)]
#[columns(id: i64, ck_record_key1: i64, ck_record_key2: i64)]
#[relations(record: CkRecord)]
pub struct CkRelated {
    #[orm]
    orm: DataMapper,
}

impl Entity for CkRelated {
    fn map_entity(mapper: &mut EntityMapper) {
        mapper.table("ck_related");
        mapper
            .relation("record")
            .belongs_to::<CkRecord>()
            .foreign_key(["ck_record_key1", "ck_record_key2"]);
    }
}
