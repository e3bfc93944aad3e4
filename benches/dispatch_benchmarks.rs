// ABOUTME: Benchmark suite for the dispatch core hot paths
// ABOUTME: Measures GSM encoding, segmentation, receipt parsing and full drain cycles over SQLite

use bytes::Bytes;
use criterion::{BatchSize, BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use smpp_dispatch::config::ReportDialect;
use smpp_dispatch::datatypes::InboundUnit;
use smpp_dispatch::datatypes::Tlv;
use smpp_dispatch::datatypes::tlv::{MESSAGE_STATE, RECEIPTED_MESSAGE_ID};
use smpp_dispatch::dispatch::segment;
use smpp_dispatch::gsm;
use smpp_dispatch::report::parse_receipt;
use smpp_dispatch::store::OutboundToken;
use smpp_dispatch::{Dispatcher, GatewayConfig, LoopbackSession, SqliteQueueStore, StoreOptions};
use std::sync::Arc;
use std::time::Duration;

const RECEIPT_BODY: &str = "id:166157226 sub:001 dlvrd:001 submit date:1603110954 done date:1603110954 stat:DELIVRD err:002 text:hello";

fn sample_text(len: usize) -> String {
    "Hello [World] {€} ".chars().cycle().take(len).collect()
}

fn bench_gsm(c: &mut Criterion) {
    let mut group = c.benchmark_group("gsm");
    group.measurement_time(Duration::from_secs(5));

    for len in [16usize, 160, 1600] {
        let text = sample_text(len);
        let encoded = gsm::encode(&text);

        group.bench_with_input(BenchmarkId::new("encode", len), &text, |b, text| {
            b.iter(|| gsm::encode(black_box(text)))
        });
        group.bench_with_input(BenchmarkId::new("byte_length", len), &text, |b, text| {
            b.iter(|| gsm::byte_length(black_box(text)))
        });
        group.bench_with_input(BenchmarkId::new("decode", len), &encoded, |b, encoded| {
            b.iter(|| gsm::decode(black_box(encoded)))
        });
    }

    group.finish();
}

fn bench_segment(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment");

    for len in [160usize, 1600, 16000] {
        let payload = Bytes::from(vec![0x41u8; len]);
        group.bench_with_input(BenchmarkId::from_parameter(len), &payload, |b, payload| {
            b.iter(|| segment(black_box(payload), 160, false))
        });
    }

    group.finish();
}

fn bench_receipts(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_receipt");

    let standard = InboundUnit::new("1555", "7000", RECEIPT_BODY)
        .as_delivery_receipt()
        .with_tlv(Tlv::new(RECEIPTED_MESSAGE_ID, &b"166157226\0"[..]))
        .with_tlv(Tlv::new(MESSAGE_STATE, vec![2u8]));

    for dialect in [
        ReportDialect::Standard,
        ReportDialect::NumericDigits,
        ReportDialect::KeyedText,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{dialect:?}")),
            &standard,
            |b, unit| b.iter(|| parse_receipt(dialect, true, black_box(unit))),
        );
    }

    group.finish();
}

fn bench_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    let mut group = c.benchmark_group("drain");
    group.measurement_time(Duration::from_secs(10));

    for tokens in [10i64, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(tokens), &tokens, |b, &tokens| {
            b.iter_batched(
                || {
                    let store =
                        Arc::new(SqliteQueueStore::open_in_memory(StoreOptions::default()).unwrap());
                    for id in 1..=tokens {
                        store
                            .push_outbound(&OutboundToken::text(id, "SMS", "7000", "1555", sample_text(300)))
                            .unwrap();
                    }
                    let mut config = GatewayConfig::default();
                    config.reports.report_all = true;
                    config.dispatch.messages_per_cycle = tokens as usize;
                    let session = Arc::new(LoopbackSession::new(["127.0.0.1:2775"]));
                    Dispatcher::new(store, session, Arc::new(config))
                },
                |dispatcher| runtime.block_on(dispatcher.drain()).unwrap(),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_gsm, bench_segment, bench_receipts, bench_drain);
criterion_main!(benches);
