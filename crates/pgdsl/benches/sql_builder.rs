use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use pgdsl::{Field, PlaceholderStyle, Statement, Table, select};

type Wide = Table<(Field<i64>, Field<String>, Field<i64>)>;

fn table() -> (Field<i64>, Field<String>, Field<i64>, Wide) {
    let id = Field::<i64>::of("id").unwrap();
    let name = Field::<String>::of("name").unwrap();
    let score = Field::<i64>::of("score").unwrap();
    let table = Table::new("t", (id.clone(), name.clone(), score.clone())).unwrap();
    (id, name, score, table)
}

/// `select id, name, score from t where id in (?, ...) and score between ? and ? and name like ?`
fn build(table: &Wide, id: &Field<i64>, name: &Field<String>, score: &Field<i64>, n: i64) -> Statement {
    select(table.fields())
        .from(table)
        .where_(id.in_list())
        .and(score.between())
        .and(name.like())
        .order_by(id)
        .limit(100)
        .bind((0..n).collect::<Vec<_>>(), 10..=20, "a%")
}

fn bench_bind(c: &mut Criterion) {
    let (id, name, score, table) = table();
    let mut group = c.benchmark_group("sql_builder/bind");

    for n in [1, 10, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(build(&table, &id, &name, &score, n)));
        });
    }

    group.finish();
}

fn bench_render_dollar(c: &mut Criterion) {
    let (id, name, score, table) = table();
    let mut group = c.benchmark_group("sql_builder/render_dollar");

    for n in [1, 10, 100, 1000] {
        let statement = build(&table, &id, &name, &score, n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &statement, |b, statement| {
            b.iter(|| black_box(statement.render(PlaceholderStyle::Dollar)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_bind, bench_render_dollar);
criterion_main!(benches);
