//! Records, dirty tracking and relation resolution against a scripted connection.

use pgrecord::{
    Arg, BuilderError, CallOutcome, ConnectParams, Connection, DataRow, DeveloperContext,
    EntityDef, Executor, ExecutorConfig, OrmError, OrmResult, Outcome, QueryBuilder, Registry,
    RelationDef, Script, Value,
};
use std::collections::HashSet;
use std::sync::Arc;

static USERS: EntityDef = EntityDef::new("User", "users", "id").with_relations(&[
    RelationDef::has_many("posts", &POSTS, "user_id")
        .configure(order_posts)
        .back_ref("author"),
    RelationDef::has_one("profile", &PROFILES, "user_id"),
]);

static POSTS: EntityDef = EntityDef::new("Post", "posts", "id")
    .with_relations(&[RelationDef::belongs_to("author", &USERS, "user_id")]);

static PROFILES: EntityDef = EntityDef::new("Profile", "profiles", "id");

fn order_posts(q: &mut QueryBuilder) {
    q.order_by(&["posts.id"]);
}

fn setup() -> (Script, Arc<Executor>) {
    let script = Script::new();
    let handle = script.clone();
    let registry = Registry::with_connector(
        move |_: &ConnectParams| -> OrmResult<Box<dyn Connection>> {
            Ok(Box::new(handle.connection()))
        },
        ExecutorConfig::new().developer_context(DeveloperContext::Off),
    );
    let exec = registry
        .get(Some(&ConnectParams::new("postgres://localhost/app")))
        .unwrap();
    (script, exec)
}

fn user_row(id: i64, name: &str) -> DataRow {
    DataRow::new().with("id", id).with("name", name)
}

fn post_row(id: i64, user_id: i64) -> DataRow {
    DataRow::new().with("id", id).with("user_id", user_id).with("title", format!("post {id}"))
}

// ==================== Dirty tracking ====================

#[test]
fn fresh_record_is_clean() {
    let (_, exec) = setup();
    let user = USERS.record(&exec);
    assert!(!user.is_dirty());
    assert!(user.dirty().is_empty());
    assert!(user.pk_value().is_none());
}

#[test]
fn set_and_unset_track_dirty_fields() {
    let (_, exec) = setup();
    let mut user = USERS.record(&exec);

    user.set("name", "ann");
    assert!(user.is_field_dirty("name"));
    assert_eq!(user.dirty().get("name"), Some(&Value::from("ann")));

    user.set("name", "bob");
    assert_eq!(user.dirty().len(), 1);
    assert_eq!(user.get("name"), Some(&Value::from("bob")));

    user.unset("name");
    assert!(!user.is_dirty());
    assert!(user.get("name").is_none());

    user.set("email", "a@example.com").clear_dirty();
    assert!(!user.is_dirty());
    assert_eq!(user.get("email"), Some(&Value::from("a@example.com")));
}

#[tokio::test]
async fn fetched_records_are_clean() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(vec![user_row(1, "ann")]);

    let mut users = USERS.record(&exec);
    users.eq("name", "ann");
    let user = users.fetch().await?.expect("row");

    assert!(!user.is_dirty());
    assert_eq!(user.pk_value(), Some(&Value::Int(1)));
    assert_eq!(user.to_json(), serde_json::json!({"id": 1, "name": "ann"}));
    assert_eq!(
        script.executed()[0],
        (
            "SELECT users.* FROM users WHERE users.name = $1 LIMIT 1".to_string(),
            vec![Value::from("ann")]
        )
    );
    Ok(())
}

#[tokio::test]
async fn fetch_all_and_empty_fetch() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(vec![user_row(1, "ann"), user_row(2, "bob")]).rows(vec![]);

    let mut users = USERS.record(&exec);
    let all = users.fetch_all().await?;
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].get("name"), Some(&Value::from("bob")));

    assert!(users.find(99).await?.is_none());
    assert_eq!(
        script.statements(),
        [
            "SELECT users.* FROM users",
            "SELECT users.* FROM users WHERE users.id = $1 LIMIT 1"
        ]
    );
    Ok(())
}

// ==================== Writes ====================

#[tokio::test]
async fn insert_stores_generated_id_without_dirtying_it() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(vec![DataRow::new().with("id", 7)]);

    let mut user = USERS.record(&exec);
    user.set("name", "ann").set("email", "ann@example.com");
    let outcome = user.insert().await?;

    assert_eq!(outcome, Outcome::InsertId(7));
    assert_eq!(user.pk_value(), Some(&Value::Int(7)));
    assert!(!user.is_dirty());
    assert_eq!(
        script.executed()[0],
        (
            "INSERT INTO users (email,name) VALUES ($1,$2) RETURNING id".to_string(),
            vec![Value::from("ann@example.com"), Value::from("ann")]
        )
    );
    Ok(())
}

#[tokio::test]
async fn insert_reads_the_key_column_not_the_first_integer() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script
        .rows(vec![DataRow::new().with("tenant_id", 7).with("id", 42)])
        .command(1);

    let mut user = USERS.record(&exec);
    user.set("tenant_id", 7).set("name", "ann");
    assert_eq!(user.insert().await?, Outcome::InsertId(42));
    assert_eq!(user.pk_value(), Some(&Value::Int(42)));
    assert_eq!(user.get("tenant_id"), Some(&Value::Int(7)));

    user.set("name", "bob");
    user.update().await?;
    assert_eq!(
        script.executed()[1],
        (
            "UPDATE users SET name = $1 WHERE users.id = $2".to_string(),
            vec![Value::from("bob"), Value::Int(42)]
        )
    );
    Ok(())
}

#[tokio::test]
async fn insert_stores_a_non_integer_key() -> anyhow::Result<()> {
    static MEMBERSHIPS: EntityDef = EntityDef::new("Membership", "memberships", "token");
    let (script, exec) = setup();
    let token = uuid::Uuid::from_u128(0x7a3c_0000_0000_4000_8000_0000_0000_0001);
    script.rows(vec![DataRow::new().with("token", token)]);

    let mut membership = MEMBERSHIPS.record(&exec);
    membership.set("user_id", 3);
    assert_eq!(membership.insert().await?, Outcome::AffectedRows(1));
    assert_eq!(membership.pk_value(), Some(&Value::Uuid(token)));
    assert!(!membership.is_dirty());
    assert_eq!(
        script.statements(),
        ["INSERT INTO memberships (user_id) VALUES ($1) RETURNING token"]
    );
    Ok(())
}

#[tokio::test]
async fn insert_without_a_returned_row_keeps_the_key_unset() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(Vec::new());

    let mut user = USERS.record(&exec);
    user.set("name", "ann");
    assert_eq!(user.insert().await?, Outcome::Success);
    assert!(user.pk_value().is_none());
    assert_eq!(script.statements().len(), 1);
    Ok(())
}

#[tokio::test]
async fn update_writes_only_dirty_fields() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(vec![user_row(3, "ann")]).command(1);

    let mut user = USERS.record(&exec).find(3).await?.expect("row");
    assert_eq!(user.update().await?, Outcome::Success);
    assert_eq!(script.statements().len(), 1, "clean update must not hit the server");

    user.set("name", "anne");
    assert_eq!(user.update().await?, Outcome::AffectedRows(1));
    assert!(!user.is_dirty());
    assert_eq!(
        script.executed()[1],
        (
            "UPDATE users SET name = $1 WHERE users.id = $2".to_string(),
            vec![Value::from("anne"), Value::Int(3)]
        )
    );
    Ok(())
}

#[tokio::test]
async fn update_and_delete_need_a_primary_key() {
    let (script, exec) = setup();
    let mut user = USERS.record(&exec);
    user.set("name", "ann");

    let err = user.update().await.unwrap_err();
    assert!(matches!(err, OrmError::Builder(BuilderError::MissingPrimaryKey(_))));
    let err = user.delete().await.unwrap_err();
    assert!(err.is_builder());
    assert!(script.statements().is_empty());
}

#[tokio::test]
async fn delete_by_primary_key() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.command(1);

    let mut user = USERS.record(&exec);
    user.set("id", 5).clear_dirty();
    assert_eq!(user.delete().await?, Outcome::AffectedRows(1));
    assert_eq!(script.statements(), ["DELETE FROM users WHERE users.id = $1"]);
    Ok(())
}

#[tokio::test]
async fn failed_statement_is_an_error_and_resets_the_builder() {
    let (script, exec) = setup();
    script.fail(pgrecord::BackendError::statement("42703: column \"nope\" does not exist"));

    let mut users = USERS.record(&exec);
    users.eq("nope", 1);
    let err = users.fetch_all().await.unwrap_err();
    assert!(matches!(&err, OrmError::Statement(msg) if msg.contains("42703")));
    assert!(users.state().is_empty());
    assert_eq!(exec.last_errors().len(), 1);
}

#[tokio::test]
async fn deferred_shape_error_blocks_the_statement() {
    let (script, exec) = setup();
    let mut users = USERS.record(&exec);
    users.filter("age", pgrecord::Op::In, Arg::many(Vec::<i64>::new()), Default::default());

    let err = users.fetch_all().await.unwrap_err();
    assert!(matches!(err, OrmError::Builder(BuilderError::OperandShape { .. })));
    assert!(script.statements().is_empty());
}

// ==================== Relations ====================

#[tokio::test]
async fn has_many_resolves_once_and_sets_back_refs() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script
        .rows(vec![user_row(1, "ann")])
        .rows(vec![post_row(10, 1), post_row(11, 1)]);

    let mut user = USERS.record(&exec).find(1).await?.expect("row");
    assert!(user.cached("posts").is_none());

    let first = user.resolve("posts").await?.len();
    let second = user.resolve("posts").await?.len();
    assert_eq!((first, second), (2, 2));
    assert_eq!(script.statements().len(), 2, "second resolve must hit the cache");
    assert_eq!(
        script.executed()[1],
        (
            "SELECT posts.* FROM posts WHERE posts.user_id = $1 ORDER BY posts.id".to_string(),
            vec![Value::Int(1)]
        )
    );

    let posts = user.cached("posts").expect("cached").as_many();
    for post in posts {
        let author = post.back_ref("author").expect("back-reference");
        assert_eq!(author.pk_value(), Some(&Value::Int(1)));
        assert_eq!(author.get("name"), Some(&Value::from("ann")));
    }
    Ok(())
}

#[tokio::test]
async fn invalidate_forces_a_new_query() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(vec![post_row(10, 1)]).rows(vec![]);

    let mut user = USERS.record(&exec);
    user.set("id", 1);
    assert_eq!(user.resolve("posts").await?.len(), 1);
    assert!(user.invalidate("posts"));
    assert!(!user.invalidate("posts"));
    assert!(user.resolve("posts").await?.is_empty());
    assert_eq!(script.statements().len(), 2);
    Ok(())
}

#[tokio::test]
async fn belongs_to_follows_the_foreign_key() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(vec![post_row(10, 4)]).rows(vec![user_row(4, "dee")]);

    let mut post = POSTS.record(&exec).find(10).await?.expect("row");
    let author = post.resolve("author").await?.as_one().expect("author");
    assert_eq!(author.get("name"), Some(&Value::from("dee")));
    assert_eq!(
        script.statements()[1],
        "SELECT users.* FROM users WHERE users.id = $1 LIMIT 1"
    );
    Ok(())
}

#[tokio::test]
async fn belongs_to_without_foreign_key_skips_the_query() -> anyhow::Result<()> {
    let (script, exec) = setup();
    let mut post = POSTS.record(&exec);
    post.set("id", 1).set("user_id", Value::Null);

    assert!(post.resolve("author").await?.as_one().is_none());
    assert!(script.statements().is_empty());
    Ok(())
}

#[tokio::test]
async fn has_one_fetches_a_single_row() -> anyhow::Result<()> {
    let (script, exec) = setup();
    script.rows(vec![DataRow::new().with("id", 2).with("user_id", 1)]);

    let mut user = USERS.record(&exec);
    user.set("id", 1);
    let profile = user.resolve("profile").await?;
    assert_eq!(profile.len(), 1);
    assert_eq!(
        script.statements(),
        ["SELECT profiles.* FROM profiles WHERE profiles.user_id = $1 LIMIT 1"]
    );
    Ok(())
}

#[tokio::test]
async fn unknown_relation_is_an_error() {
    let (_, exec) = setup();
    let mut user = USERS.record(&exec);
    let err = user.resolve("comments").await.unwrap_err();
    match err {
        OrmError::Builder(BuilderError::UnknownRelation { entity, name }) => {
            assert_eq!(entity, "User");
            assert_eq!(name, "comments");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn has_many_needs_the_owner_key() {
    let (_, exec) = setup();
    let mut user = USERS.record(&exec);
    assert!(user.resolve("posts").await.unwrap_err().is_builder());
}

// ==================== Dynamic calls ====================

#[tokio::test]
async fn record_call_forwards_executor_operations() -> anyhow::Result<()> {
    let (script, exec) = setup();
    let mut user = USERS.record(&exec);

    assert_eq!(
        user.call("eq", &["name".into(), "ann".into()]).await?,
        CallOutcome::Chained
    );
    assert_eq!(user.call("beginTransaction", &[]).await?, CallOutcome::Flag(true));
    assert_eq!(user.call("beginTransaction", &[]).await?, CallOutcome::Flag(false));
    match user.call("lastErrors", &[]).await? {
        CallOutcome::Errors(errors) => assert_eq!(errors.len(), 1),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(user.call("end_transaction", &[]).await?, CallOutcome::Flag(false));
    assert_eq!(user.call("reconnect", &[false.into()]).await?, CallOutcome::Flag(true));
    assert_eq!(script.connects(), 2);

    let err = user.call("explode", &[]).await.unwrap_err();
    assert!(matches!(err, OrmError::Builder(BuilderError::UnknownCall(name)) if name == "explode"));
    Ok(())
}

// ==================== Placeholders ====================

#[tokio::test]
async fn placeholder_names_never_repeat_across_records() {
    let (_, exec) = setup();
    let builders = (0..8).map(|i| {
        let exec = Arc::clone(&exec);
        async move {
            let mut record = if i % 2 == 0 { USERS.record(&exec) } else { POSTS.record(&exec) };
            for n in 0..25 {
                record.eq("id", n);
            }
            record
                .params()
                .iter()
                .map(|(name, _)| name.to_string())
                .collect::<Vec<_>>()
        }
    });

    let mut seen = HashSet::new();
    for names in futures_util::future::join_all(builders).await {
        for name in names {
            assert!(seen.insert(name.clone()), "duplicate placeholder {name}");
        }
    }
    assert_eq!(seen.len(), 200);
}
