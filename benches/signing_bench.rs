//! Criterion benchmarks for hot paths in the studygate gateway.
//!
//! Run with:
//!   cargo bench
//!
//! Covers:
//!   - Vendor percent-encoding (per key/value on every signed request)
//!   - Canonical query assembly (BTreeMap walk + encoding)
//!   - Full request signing (canonicalize + HMAC-SHA1 + base64)

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::collections::BTreeMap;
use studygate::signing::{canonical_query, vendor_encode, Signer};

// ─── Fixtures ────────────────────────────────────────────────────────────────

/// The parameter set of a realistic translation call, auth params included.
fn translate_params() -> BTreeMap<String, String> {
    [
        ("Action", "TranslateGeneral"),
        ("Format", "JSON"),
        ("Version", "2018-10-12"),
        ("Scene", "general"),
        ("SourceLanguage", "en"),
        ("TargetLanguage", "zh"),
        (
            "SourceText",
            "Plan tomorrow: review flashcards, then a 25 minute focus block.",
        ),
        ("SignatureNonce", "1724360000000"),
        ("Timestamp", "2026-08-22T20:13:20.000Z"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

// ─── Percent-encoding ────────────────────────────────────────────────────────

fn bench_vendor_encode(c: &mut Criterion) {
    let clean = "TranslateGeneral2018-10-12_general.scene~ok";
    let escape_heavy = "复习 计划: 25 minutes of focus + review & rest*";
    let long_clean = "a".repeat(4096);

    c.bench_function("encode_clean_ascii", |b| {
        b.iter(|| {
            let e = vendor_encode(black_box(clean));
            black_box(e);
        });
    });

    c.bench_function("encode_escape_heavy", |b| {
        b.iter(|| {
            let e = vendor_encode(black_box(escape_heavy));
            black_box(e);
        });
    });

    c.bench_function("encode_long_clean_4k", |b| {
        b.iter(|| {
            let e = vendor_encode(black_box(&long_clean));
            black_box(e);
        });
    });
}

// ─── Canonicalization and signing ────────────────────────────────────────────

fn bench_canonical_query(c: &mut Criterion) {
    let params = translate_params();

    c.bench_function("canonical_query_translate", |b| {
        b.iter(|| {
            let q = canonical_query(black_box(&params));
            black_box(q);
        });
    });
}

fn bench_sign(c: &mut Criterion) {
    let signer = Signer::new("LTAI4BenchKeyId", "benchSecret0123456789");
    let params = translate_params();

    c.bench_function("sign_translate_request", |b| {
        b.iter(|| {
            let signed = signer.sign(black_box("GET"), black_box(&params)).unwrap();
            black_box(signed);
        });
    });

    c.bench_function("sign_and_build_query", |b| {
        b.iter(|| {
            let signed = signer.sign(black_box("GET"), black_box(&params)).unwrap();
            let q = signed.query_string();
            black_box(q);
        });
    });
}

// ─── Entry point ─────────────────────────────────────────────────────────────

criterion_group!(benches, bench_vendor_encode, bench_canonical_query, bench_sign);
criterion_main!(benches);
