//! Benchmarks for Firebird value encoding and decoding.

#![allow(clippy::unwrap_used, clippy::approx_constant, missing_docs)]

use bytes::{Bytes, BytesMut};
use chrono::NaiveDate;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use firebird_types::{Charset, FromSql, SqlValue, ToSql, decode_value, encode_value};
use gds_protocol::ColumnDescriptor;
use gds_protocol::types::sql_type;
use rust_decimal::Decimal;
use std::hint::black_box;

/// Benchmark text encoding through a connection charset.
fn bench_text_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_encode");
    let column = ColumnDescriptor::new(sql_type::VARYING, 400).with_sub_type(4);
    let win1251 = Charset::from_name("WIN1251").unwrap();

    let ascii = SqlValue::from("This is a typical database column value with some content");
    group.throughput(Throughput::Bytes(58));
    group.bench_function("utf8_ascii", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(128);
            encode_value(black_box(&ascii), &column, Charset::UTF8, &mut buf).unwrap();
            black_box(buf)
        })
    });

    let cyrillic = SqlValue::from("Съешь же ещё этих мягких французских булок");
    group.bench_function("utf8_cyrillic", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(128);
            encode_value(black_box(&cyrillic), &column, Charset::UTF8, &mut buf).unwrap();
            black_box(buf)
        })
    });

    group.bench_function("win1251_cyrillic", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(128);
            encode_value(black_box(&cyrillic), &column, win1251, &mut buf).unwrap();
            black_box(buf)
        })
    });

    group.finish();
}

/// Benchmark decoding raw column slices into values.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let int_col = ColumnDescriptor::new(sql_type::LONG, 4);
    let int_raw = Bytes::copy_from_slice(&42i32.to_be_bytes());
    group.bench_function("integer", |b| {
        b.iter(|| decode_value(Some(black_box(&int_raw)), &int_col, Charset::NONE).unwrap())
    });

    let num_col = ColumnDescriptor::new(sql_type::INT64, 8).with_scale(-4);
    let num_raw = Bytes::copy_from_slice(&123_456_789i64.to_be_bytes());
    group.bench_function("numeric_18_4", |b| {
        b.iter(|| decode_value(Some(black_box(&num_raw)), &num_col, Charset::NONE).unwrap())
    });

    let ts_col = ColumnDescriptor::new(sql_type::TIMESTAMP, 8);
    let mut ts = Vec::new();
    ts.extend_from_slice(&60_000i32.to_be_bytes());
    ts.extend_from_slice(&123_456_789i32.to_be_bytes());
    let ts_raw = Bytes::from(ts);
    group.bench_function("timestamp", |b| {
        b.iter(|| decode_value(Some(black_box(&ts_raw)), &ts_col, Charset::NONE).unwrap())
    });

    let text_col = ColumnDescriptor::new(sql_type::VARYING, 400).with_sub_type(4);
    let text_raw = Bytes::from_static("Съешь же ещё этих мягких французских булок".as_bytes());
    group.throughput(Throughput::Bytes(text_raw.len() as u64));
    group.bench_function("utf8_text", |b| {
        b.iter(|| decode_value(Some(black_box(&text_raw)), &text_col, Charset::UTF8).unwrap())
    });

    group.finish();
}

/// Benchmark ToSql conversions (Rust type to SqlValue).
fn bench_to_sql(c: &mut Criterion) {
    let mut group = c.benchmark_group("to_sql");

    group.bench_function("i32", |b| b.iter(|| black_box(42i32).to_sql().unwrap()));
    group.bench_function("string", |b| {
        let s = "hello world".to_string();
        b.iter(|| black_box(&s).to_sql().unwrap())
    });
    group.bench_function("decimal", |b| {
        let d = Decimal::new(314_159, 5);
        b.iter(|| black_box(d).to_sql().unwrap())
    });
    group.bench_function("option_none", |b| {
        let v: Option<i64> = None;
        b.iter(|| black_box(v).to_sql().unwrap())
    });

    group.finish();
}

/// Benchmark FromSql conversions (SqlValue to Rust type).
fn bench_from_sql(c: &mut Criterion) {
    let mut group = c.benchmark_group("from_sql");

    let int = SqlValue::Int(42);
    group.bench_function("i32", |b| b.iter(|| i32::from_sql(black_box(&int)).unwrap()));

    let text = SqlValue::from("hello world");
    group.bench_function("string", |b| {
        b.iter(|| String::from_sql(black_box(&text)).unwrap())
    });

    let date = SqlValue::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    group.bench_function("date", |b| {
        b.iter(|| NaiveDate::from_sql(black_box(&date)).unwrap())
    });

    let null = SqlValue::Null;
    group.bench_function("option_null", |b| {
        b.iter(|| Option::<i32>::from_sql(black_box(&null)).unwrap())
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_text_encode,
    bench_decode,
    bench_to_sql,
    bench_from_sql
);
criterion_main!(benches);
