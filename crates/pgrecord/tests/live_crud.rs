//! End-to-end CRUD against a live PostgreSQL database.
//!
//! Set `DATABASE_URL` to run this test; it skips itself otherwise.

use pgrecord::{
    DbError, DbResult, Format, FromRow, Model, QueryBuilder, Rule, Validator, Value, query,
};

#[derive(Debug, Clone, FromRow, Model)]
#[record(table = "people")]
struct Person {
    id: Option<i64>,
    #[record(fillable)]
    name: String,
    #[record(fillable)]
    email: String,
}

#[tokio::test]
async fn live_crud_roundtrip() -> DbResult<()> {
    let database_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping live_crud_roundtrip");
            return Ok(());
        }
    };

    let pool = pgrecord::create_pool(&database_url)?;
    let conn = pool.get().await?;

    query("DROP TABLE IF EXISTS people").execute(&conn).await?;
    query(
        "CREATE TABLE people (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL
        )",
    )
    .execute(&conn)
    .await?;

    // Mass-assignment insert, re-fetched by the generated key. The `admin`
    // attribute is not fillable and must be dropped on the floor.
    let created = Person::create(
        &conn,
        &[
            ("name".to_string(), Value::from("Ada")),
            ("email".to_string(), Value::from("ada@example.com")),
            ("admin".to_string(), Value::Bool(true)),
        ],
    )
    .await?;
    let mut ada = created.ok_or_else(|| DbError::build("create returned no record"))?;
    assert_eq!(ada.name, "Ada");
    assert_eq!(ada.email, "ada@example.com");
    let ada_id = ada
        .key()
        .ok_or_else(|| DbError::build("created record has no key"))?;

    let found = Person::find(&conn, ada_id).await?;
    assert_eq!(found.map(|p| p.name), Some("Ada".to_string()));
    assert!(Person::find(&conn, -1).await?.is_none());

    // Second row through the bare builder.
    QueryBuilder::table("people")
        .insert(
            &conn,
            &[vec![
                ("name".to_string(), Value::from("Grace")),
                ("email".to_string(), Value::from("grace@example.com")),
            ]],
        )
        .await?;

    assert_eq!(Person::all(&conn).await?.len(), 2);
    assert_eq!(Person::query().count(&conn).await?, 2);
    assert_eq!(
        Person::where_("email", "LIKE", "%@example.com").count(&conn).await?,
        2
    );

    // save() on a loaded record takes the update path.
    ada.name = "Ada Lovelace".to_string();
    ada.save(&conn).await?;
    let reloaded = Person::find(&conn, ada_id).await?;
    assert_eq!(reloaded.map(|p| p.name), Some("Ada Lovelace".to_string()));

    // update_attrs assigns and persists in one call.
    let affected = ada
        .update_attrs(
            &conn,
            &[("email".to_string(), Value::from("ada@lovelace.dev"))],
        )
        .await?;
    assert_eq!(affected, 1);
    assert_eq!(ada.email, "ada@lovelace.dev");

    // Raw statements with named and positional bindings.
    let rows = query("SELECT name FROM people WHERE email = :email")
        .bind("email", "ada@lovelace.dev")
        .fetch_all(&conn)
        .await?;
    assert_eq!(rows.len(), 1);

    let rows = query("SELECT email FROM people WHERE name != ?")
        .push("nobody")
        .fetch_all(&conn)
        .await?;
    assert_eq!(rows.len(), 2);

    // The unique rule sees the live table.
    let errors = Validator::new()
        .field(
            "email",
            &[
                Rule::Required,
                Rule::Format(Format::Email),
                Rule::Unique {
                    table: "people",
                    column: "email",
                    ignore: None,
                },
            ],
        )
        .check_db(&conn, &[("email", "ada@lovelace.dev")])
        .await?;
    assert_eq!(errors.first_for("email"), Some("Already taken."));

    // Re-validating her own email on an update ignores her row.
    let own_row = Validator::new()
        .field(
            "email",
            &[Rule::Unique {
                table: "people",
                column: "email",
                ignore: Some(("id", Value::Int(ada_id))),
            }],
        )
        .check_db(&conn, &[("email", "ada@lovelace.dev")])
        .await?;
    assert!(own_row.is_empty());

    let clean = Validator::new()
        .field(
            "email",
            &[Rule::Unique {
                table: "people",
                column: "email",
                ignore: None,
            }],
        )
        .check_db(&conn, &[("email", "nobody@example.com")])
        .await?;
    assert!(clean.is_empty());

    // save() on a fresh record takes the insert path and adopts the key.
    let mut margaret = Person {
        id: None,
        name: "Margaret".into(),
        email: "margaret@example.com".into(),
    };
    margaret.save(&conn).await?;
    let margaret_id = margaret
        .key()
        .ok_or_else(|| DbError::build("save did not adopt a key"))?;
    assert_eq!(Person::destroy(&conn, margaret_id).await?, 1);
    assert_eq!(Person::query().count(&conn).await?, 2);

    let ids: Vec<i64> = Person::all(&conn)
        .await?
        .iter()
        .filter_map(|p| p.key())
        .collect();
    assert_eq!(Person::destroy_many(&conn, &ids).await?, 2);
    assert_eq!(Person::query().count(&conn).await?, 0);

    query("DROP TABLE people").execute(&conn).await?;
    Ok(())
}
