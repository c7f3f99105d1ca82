//! End-to-end runs against a live PostgreSQL. Skipped when `DATABASE_URL` is unset.
#![cfg(feature = "pool")]

use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{StreamExt, TryStreamExt};
use pgdsl::{
    DslResult, Field, PgBackend, PgConfig, PgReactiveBackend, Program, Table, delete_from,
    insert_into, query_stream, select, sql, update,
};

type Notes = Table<(Field<i64>, Field<String>)>;

fn config(test: &str) -> Option<PgConfig> {
    dotenvy::dotenv().ok();
    match PgConfig::from_env() {
        Ok(config) => Some(config.with_max_pool_size(4)),
        Err(_) => {
            eprintln!("DATABASE_URL is not set; skipping {test}");
            None
        }
    }
}

/// A table name no other test run uses.
fn unique_table(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before UNIX_EPOCH")
        .as_nanos();
    format!("pgdsl_{prefix}_{}_{nanos}", std::process::id())
}

fn notes(name: &str) -> (Field<i64>, Field<String>, Notes) {
    let id = Field::<i64>::of("id").unwrap();
    let body = Field::<String>::of("body").unwrap();
    let table = Table::new(name, (id.clone(), body.clone())).unwrap();
    (id, body, table)
}

fn create(name: &str) -> Program<()> {
    Program::update(sql(format!("create table {name} (id bigserial primary key, body text not null)")).unwrap())
}

fn drop_table(name: &str) -> Program<()> {
    Program::update(sql(format!("drop table if exists {name}")).unwrap())
}

#[test]
fn blocking_roundtrip_with_generated_key() -> DslResult<()> {
    let Some(config) = config("blocking_roundtrip_with_generated_key") else {
        return Ok(());
    };
    let backend = PgBackend::connect(config)?;
    let name = unique_table("blocking");
    let (id, body, table) = notes(&name);

    let lookup = table.clone();
    let key_field = id.clone();
    let program = create(&name)
        .and_then(Program::update_returning(
            insert_into(&table).values(&body).bind("first"),
            &id,
        ))
        .then(move |generated| {
            let key = generated.unwrap_or_default();
            Program::query_one(
                select(lookup.fields()).from(&lookup).where_(key_field.eq()).bind(key),
                lookup.decoder(),
            )
            .map(move |row| (generated, row))
        });

    let result = program.run(&backend);
    drop_table(&name).run(&backend)?;

    let (generated, row) = result?;
    let generated = generated.expect("insert returned a key");
    assert_eq!(row, Some((generated, "first".to_string())));
    Ok(())
}

#[test]
fn blocking_updates_deletes_and_drift() -> DslResult<()> {
    let Some(config) = config("blocking_updates_deletes_and_drift") else {
        return Ok(());
    };
    let backend = PgBackend::connect(config)?;
    let name = unique_table("crud");
    let (id, body, table) = notes(&name);

    let drifted = Table::new(name.as_str(), (id.clone(), Field::<String>::of("title")?))?;
    let program = create(&name)
        .and_then(Program::update(
            insert_into(&table).values(table.fields()).bind(1, "a"),
        ))
        .and_then(Program::update(
            insert_into(&table).values(table.fields()).bind(2, "b"),
        ))
        .and_then(Program::update_count(
            update(&table).set(&body).where_(id.in_list()).bind("c", vec![1, 2]),
        ))
        .then({
            let table = table.clone();
            let id = id.clone();
            move |updated| {
                Program::update_count(delete_from(&table).where_(id.eq()).bind(2))
                    .map(move |deleted| (updated, deleted))
            }
        })
        .then({
            let table = table.clone();
            move |counts| {
                Program::validate(select(table.fields()).from(&table).bind(), &drifted)
                    .map(move |drift| (counts, drift))
            }
        });

    let result = program.run_captured(&backend);
    drop_table(&name).run(&backend)?;

    let ((updated, deleted), drift) = result?;
    assert_eq!((updated, deleted), (2, 1));
    assert_eq!(
        drift.unwrap_err().issues(),
        ["title not found", "body not mapped"]
    );
    Ok(())
}

#[tokio::test]
async fn reactive_program_stream_and_row_stream() -> DslResult<()> {
    let Some(config) = config("reactive_program_stream_and_row_stream") else {
        return Ok(());
    };
    let backend = PgReactiveBackend::connect(config)?;
    let name = unique_table("reactive");
    let (id, body, table) = notes(&name);

    let seeded = create(&name)
        .and_then(Program::update(
            insert_into(&table).values(&body).bind("x"),
        ))
        .and_then(Program::update(
            insert_into(&table).values(&body).bind("y"),
        ))
        .and_then(Program::query(
            select(id.count()).from(&table).bind(),
            |row| row.get_at::<i64>(0),
        ));

    let mut stream = seeded.stream(&backend);
    let count = stream.next().await.expect("one result");
    assert!(stream.next().await.is_none());

    let bodies: DslResult<Vec<String>> = query_stream(
        &backend,
        select(&body).from(&table).order_by(&id).bind(),
        |row| row.get(&body),
    )
    .try_collect()
    .await;

    drop_table(&name).run_async(&backend).await?;

    assert_eq!(count?, 2);
    assert_eq!(bodies?, ["x", "y"]);
    Ok(())
}

#[tokio::test]
async fn reactive_unique_violation_is_classified() -> DslResult<()> {
    let Some(config) = config("reactive_unique_violation_is_classified") else {
        return Ok(());
    };
    let backend = PgReactiveBackend::connect(config)?;
    let name = unique_table("unique");
    let (_, _, table) = notes(&name);

    let insert = || Program::update(insert_into(&table).values(table.fields()).bind(7, "dup"));
    let result = create(&name)
        .and_then(insert())
        .and_then(insert())
        .run_async(&backend)
        .await;
    drop_table(&name).run_async(&backend).await?;

    assert!(result.unwrap_err().is_unique_violation());
    Ok(())
}

#[test]
fn blocking_aggregates_decode_as_declared() -> DslResult<()> {
    let Some(config) = config("blocking_aggregates_decode_as_declared") else {
        return Ok(());
    };
    let backend = PgBackend::connect(config)?;
    let name = unique_table("aggregates");
    let (id, body, table) = notes(&name);

    let program = create(&name)
        .and_then(Program::update(
            insert_into(&table).values(table.fields()).bind(1, "a"),
        ))
        .and_then(Program::update(
            insert_into(&table).values(table.fields()).bind(2, "b"),
        ))
        .and_then(Program::query(
            select((id.sum(), id.max(), id.avg(), body.count())).from(&table).bind(),
            |row| {
                Ok((
                    row.get_at::<i64>(0)?,
                    row.get_at::<i64>(1)?,
                    row.get_at::<f64>(2)?,
                    row.get_at::<i64>(3)?,
                ))
            },
        ));

    let result = program.run(&backend);
    drop_table(&name).run(&backend)?;

    // sum(int8) comes back as numeric
    assert_eq!(result?, (3, 2, 1.5, 2));
    Ok(())
}
