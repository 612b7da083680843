//! Benchmarks for the client's text-processing hot paths.

#![allow(missing_docs, clippy::unwrap_used)]

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use firebird_client::Config;
use firebird_client::batch::split_batch;
use firebird_client::rewrite::rewrite_named_parameters;
use std::hint::black_box;

fn bench_connection_string_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("connection_string");

    let simple = "DataSource=localhost;Database=/data/app.fdb;User=SYSDBA;Password=masterkey";
    group.throughput(Throughput::Bytes(simple.len() as u64));
    group.bench_function("simple", |b| {
        b.iter(|| black_box(Config::from_connection_string(black_box(simple))))
    });

    let full = "DataSource=db.example.com;Port=3051;Database=/data/app.fdb;User=SYSDBA;\
                Password=masterkey;Role=ADMIN;Dialect=3;Charset=UTF8;Packet Size=8192;\
                Connection Timeout=30;Connection Lifetime=300;Pooling=true;Fetch Size=400";
    group.throughput(Throughput::Bytes(full.len() as u64));
    group.bench_function("full", |b| {
        b.iter(|| black_box(Config::from_connection_string(black_box(full))))
    });

    group.finish();
}

fn bench_rewrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("rewrite");

    let plain = "SELECT ID, NAME, EMAIL FROM CUSTOMERS WHERE ID = ? AND STATUS = 'A'";
    group.bench_function("no_named", |b| {
        b.iter(|| black_box(rewrite_named_parameters(black_box(plain))))
    });

    let named = "UPDATE CUSTOMERS SET NAME = @name, EMAIL = @email, NOTE = 'mail @ me' \
                 WHERE ID = @id AND VERSION = @version";
    group.throughput(Throughput::Bytes(named.len() as u64));
    group.bench_function("named", |b| {
        b.iter(|| black_box(rewrite_named_parameters(black_box(named))))
    });

    group.finish();
}

fn bench_split_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_batch");

    let script: String = (0..100)
        .map(|i| format!("INSERT INTO LOG (ID, MSG) VALUES ({i}, 'line; {i}');\n"))
        .collect();
    group.throughput(Throughput::Bytes(script.len() as u64));
    group.bench_function("100_statements", |b| {
        b.iter(|| black_box(split_batch(black_box(&script), ";")))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_connection_string_parsing,
    bench_rewrite,
    bench_split_batch
);
criterion_main!(benches);
