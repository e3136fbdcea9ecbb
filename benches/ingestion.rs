use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_sheet_ingest::execution::ExecutionOptions;
use rust_sheet_ingest::ingestion::{parse_delimited_text, parse_source, IngestionFormat, IngestionOptions};
use rust_sheet_ingest::types::{FieldSpec, Schema};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
#[allow(dead_code)]
struct Project {
    name: String,
    score: i64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
#[allow(dead_code)]
struct Student {
    email: String,
    first_name: String,
    languages: Vec<String>,
    projects: Vec<Project>,
}

fn schema() -> Schema {
    Schema::new(
        true,
        vec![
            FieldSpec::new("A", "email"),
            FieldSpec::new("B", "first_name"),
            FieldSpec::new("C", "languages").multiple(),
            FieldSpec::new("D", "languages").multiple(),
            FieldSpec::new("E", "projects.name").map().multiple().map_start(),
            FieldSpec::new("F", "projects.score").map().multiple(),
            FieldSpec::new("G", "projects.name").map().multiple().map_start(),
            FieldSpec::new("H", "projects.score").map().multiple(),
        ],
    )
}

fn csv_input(rows: usize) -> String {
    let mut out = String::from("Email,First,L1,L2,P1,S1,P2,S2\n");
    for i in 0..rows {
        out.push_str(&format!(
            "student{i}@x,Name_{i},Golang,Python,Songbird,{},Tetris,{}\n",
            i % 100,
            (i * 7) % 100
        ));
    }
    out
}

fn benchmark_delimited_text(c: &mut Criterion) {
    let mut group = c.benchmark_group("delimited_text");
    let schema = schema();

    for size in [100, 1000, 10000].iter() {
        let input = csv_input(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let mut out: Vec<Student> = Vec::new();
                parse_delimited_text(&mut out, input.as_bytes(), &schema).unwrap();
                black_box(out);
            });
        });
    }

    group.finish();
}

fn benchmark_parallel_decode(c: &mut Criterion) {
    let schema = schema();
    let input = csv_input(10000);
    let opts = IngestionOptions {
        format: Some(IngestionFormat::DelimitedText),
        execution: Some(ExecutionOptions::default()),
        ..Default::default()
    };

    c.bench_function("parallel_decode_10000_rows", |b| {
        b.iter(|| {
            let mut out: Vec<Student> = Vec::new();
            parse_source(&mut out, "bench.csv", input.as_bytes(), &schema, &opts).unwrap();
            black_box(out);
        });
    });
}

criterion_group!(benches, benchmark_delimited_text, benchmark_parallel_decode);
criterion_main!(benches);
