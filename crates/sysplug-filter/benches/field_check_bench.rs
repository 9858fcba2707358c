//! Performance benchmarks for plugin field checks
//!
//! Run with: cargo bench --package sysplug-filter

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::ffi::CStr;
use std::sync::Arc;
use sysplug_core::event::{Event, EventSources, PLUGIN_EVENT_CODE};
use sysplug_filter::{parse_index, PluginFieldCheck};
use sysplug_plugin_api::testing::{MockModule, MockValue};
use sysplug_plugin_api::{Plugin, TableRegistry};

const FIELDS: &str = r#"[
    {"type": "uint64", "name": "bench.value", "desc": "A value", "arg": {"isIndex": true}},
    {"type": "string", "name": "bench.name", "desc": "A name"}
]"#;

fn bench_parse_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_index");

    for arg in ["0", "4096", "18446744073709551615", "12a"] {
        group.bench_with_input(BenchmarkId::new("parse", arg), &arg, |b, &arg| {
            b.iter(|| black_box(parse_index(black_box(arg))))
        });
    }

    group.finish();
}

fn bench_field_check(c: &mut Criterion) {
    let mock = MockModule::new("bench")
        .with_extraction(FIELDS)
        .with_value("bench.value", MockValue::Uint64(vec![42]))
        .with_value("bench.name", MockValue::String(vec!["alpha".to_string()]));
    let plugin = Plugin::from_api(mock.api(), Arc::new(TableRegistry::new())).unwrap();
    plugin.init("").unwrap();
    let sources = EventSources::new();

    let mut group = c.benchmark_group("field_check");

    group.bench_function("parse_field_name", |b| {
        let mut check = PluginFieldCheck::new(plugin.clone(), sources.clone()).unwrap();
        b.iter(|| black_box(check.parse_field_name(black_box("bench.value[12] > 3")).unwrap()))
    });

    let source_name = CStr::from_bytes_with_nul(b"syscall\0").unwrap();
    let evt = Event {
        num: 1,
        event_type: PLUGIN_EVENT_CODE,
        source_idx: Some(0),
        source_name,
        raw: b"raw",
        payload: b"payload",
    };

    for field in ["bench.value[1]", "bench.name"] {
        let mut check = PluginFieldCheck::new(plugin.clone(), sources.clone()).unwrap();
        check.parse_field_name(field).unwrap();
        group.bench_with_input(BenchmarkId::new("extract", field), &evt, |b, evt| {
            b.iter(|| black_box(check.extract(black_box(evt)).unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parse_index, bench_field_check);
criterion_main!(benches);
