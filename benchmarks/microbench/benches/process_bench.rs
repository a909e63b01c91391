use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};
use osal_api::OsalConfig;
use osal_core::Osal;
use osal_host::HostBackend;

fn bench_process_registry(c: &mut Criterion) {
    let osal = Osal::new(HostBackend::new(), OsalConfig::default());
    osal.init().unwrap();

    // keep some records around so lookups scan a realistic table
    for i in 0..32 {
        osal.process_create(&format!("idle{i}"), None).unwrap();
    }

    c.bench_function("process_create_destroy", |b| {
        b.iter(|| {
            let process = osal.process_create(black_box("bench"), None).unwrap();
            osal.process_destroy(process).unwrap();
        });
    });

    c.bench_function("process_find_by_name", |b| {
        b.iter(|| osal.process_find_by_name(black_box("idle31")).unwrap());
    });
}

criterion_group!(benches, bench_process_registry);
criterion_main!(benches);
