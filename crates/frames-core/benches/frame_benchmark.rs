use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use frames_core::dynamic::{DynamicRuntime, Value};
use frames_core::framed;
use frames_core::parser::parse_module;
use frames_core::runtime::{FrameManager, GcPolicy};
use frames_core::transform::ClassTransformer;
use frames_core::{EmitConfig, FramesConfig, RustEmitter};

framed! {
    pub struct Counter: CounterRecord {
        count / set_count: i64 = 0,
    }
}

const DECLARATIONS: &str = r#"
    @Framed
    class Account {
        var owner: String = "nobody"
        var balance: Int = 0
        var history: List<Int> = []
        val opened: Boolean = true
    }
"#;

fn bench_readable(c: &mut Criterion) {
    let mut group = c.benchmark_group("readable");
    let manager = FrameManager::new(FramesConfig::default());
    let counter = Counter::new_in(&manager);
    manager.with_frame(|_| counter.set_count(1)).unwrap();

    group.bench_function("outside_frame", |b| b.iter(|| black_box(counter.count())));

    let frame = manager.open().unwrap();
    group.bench_function("inside_frame", |b| {
        b.iter(|| frame.enter(|| black_box(counter.count())))
    });
    frame.discard();
    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    for instances in [1usize, 16, 256] {
        let manager = FrameManager::new(FramesConfig::default());
        let counters: Vec<Counter> = (0..instances).map(|_| Counter::new_in(&manager)).collect();
        group.bench_with_input(BenchmarkId::new("write_all", instances), &instances, |b, _| {
            b.iter(|| {
                manager
                    .with_frame(|_| {
                        for counter in &counters {
                            counter.set_count(counter.count() + 1);
                        }
                    })
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn bench_chain_depth(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_depth");
    for depth in [1i64, 64, 1024] {
        let manager = FrameManager::new(FramesConfig {
            gc: GcPolicy::Manual,
            ..FramesConfig::default()
        });
        let counter = Counter::new_in(&manager);
        for value in 0..depth {
            manager.with_frame(|_| counter.set_count(value)).unwrap();
        }
        group.bench_with_input(BenchmarkId::new("read", depth), &depth, |b, _| {
            b.iter(|| black_box(counter.count()))
        });
    }
    group.finish();
}

fn bench_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");
    let module = parse_module(DECLARATIONS).unwrap();

    group.bench_function("parse", |b| b.iter(|| parse_module(black_box(DECLARATIONS)).unwrap()));
    group.bench_function("frame", |b| {
        b.iter(|| ClassTransformer::framing().transform_module(black_box(module.clone())))
    });

    let framed = ClassTransformer::framing().transform_module(module).module;
    let emitter = RustEmitter::new(EmitConfig::default());
    group.bench_function("emit", |b| {
        b.iter(|| emitter.emit_module(black_box(&framed), "bench.frames").unwrap())
    });
    group.finish();
}

fn bench_dynamic(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic");
    let runtime = DynamicRuntime::new(FrameManager::new(FramesConfig::default()));
    runtime.load_source(DECLARATIONS).unwrap();
    let account = runtime.instantiate("Account", &[]).unwrap();

    group.bench_function("get", |b| b.iter(|| account.get(black_box("balance")).unwrap()));
    group.bench_function("set_in_frame", |b| {
        b.iter(|| {
            runtime
                .manager()
                .with_frame(|_| account.set("balance", Value::Int(7)))
                .unwrap()
                .unwrap()
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_readable,
    bench_commit,
    bench_chain_depth,
    bench_transform,
    bench_dynamic
);
criterion_main!(benches);
