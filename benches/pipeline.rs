mod common;

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use wabbitc::{compile, ircode};

fn bench_pipeline(c: &mut Criterion) {
    for (label, path) in common::WORKLOADS {
        let source = common::load_source(path);

        c.bench_function(&format!("pipeline_compile_{label}"), |b| {
            b.iter(|| {
                let out = compile(path, black_box(&source)).expect("compile");
                black_box(out);
            })
        });

        c.bench_function(&format!("pipeline_compile_serialize_{label}"), |b| {
            b.iter(|| {
                let out = compile(path, black_box(&source)).expect("compile");
                let text = ircode::serialize(&out.ir);
                black_box(text);
            })
        });
    }
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
