use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use disco_extract::export::render_csv;
use disco_extract::query::builder::{build_query, QueryKind, Tables};
use disco_extract::query::request::{ExtractRequest, SchemaVersion};
use disco_extract::warehouse::Table;

fn make_request(schema_version: SchemaVersion) -> ExtractRequest {
    ExtractRequest {
        desired_url: "/government/publications/".to_string(),
        start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        schema_version,
    }
}

fn make_table(rows: usize) -> Table {
    Table {
        columns: [
            "tablesource",
            "tabledate",
            "cleaned_page_location",
            "unique_session_id",
            "event_name",
            "type",
            "datetime",
            "category",
        ]
        .iter()
        .map(|c| (*c).to_string())
        .collect(),
        rows: (0..rows)
            .map(|i| {
                vec![
                    Some("flattened_daily_ga_data_20240115".to_string()),
                    Some("20240115".to_string()),
                    Some(format!("/government/publications/page-{}", i % 500)),
                    Some(format!("{}-{}", 1_000_000 + i, 1_705_312_800 + i)),
                    Some("page_view".to_string()),
                    Some("PAGE".to_string()),
                    Some("2024-01-15 10:00:00".to_string()),
                    // Every tenth row carries a quote or formula-looking value
                    match i % 10 {
                        0 => Some("=mobile \"app\"".to_string()),
                        1 => None,
                        _ => Some("mobile".to_string()),
                    },
                ]
            })
            .collect(),
    }
}

fn bench_build_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_query");
    let tables = Tables::default();

    for (name, schema) in [("ua", SchemaVersion::Ua), ("ga4", SchemaVersion::Ga4)] {
        let request = make_request(schema);
        group.bench_function(format!("{name}_estimate"), |b| {
            b.iter(|| build_query(QueryKind::Estimate, black_box(&request), &tables));
        });
        group.bench_function(format!("{name}_extract"), |b| {
            b.iter(|| build_query(QueryKind::Extract, black_box(&request), &tables));
        });
    }

    group.finish();
}

/// Rendering cost grows with the row count of the extract.
fn bench_render_csv(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_csv");

    for size in [1_000, 10_000, 100_000] {
        let table = make_table(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &table, |b, table| {
            b.iter(|| render_csv(black_box(table)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_query, bench_render_csv);
criterion_main!(benches);
