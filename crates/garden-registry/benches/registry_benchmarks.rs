use criterion::{criterion_group, criterion_main, Criterion};
use garden_registry::{resolve_modules, ResolveOptions, TreeBuilder};
use std::path::Path;

fn write_large_tree(dir: &Path) {
    let mut builder = TreeBuilder::new();
    for c in 0..10 {
        for m in 0..20 {
            builder = builder.module(&format!("cat{c}"), &format!("mod{m}"), &["run", "<TARGET>"]);
        }
    }
    builder.write(dir).unwrap();
}

fn bench_resolve_verified(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    write_large_tree(dir.path());
    let options = ResolveOptions {
        categories: vec!["*".to_owned()],
        ..Default::default()
    };
    c.bench_function("resolve_200_modules_verified", |b| {
        b.iter(|| resolve_modules(dir.path(), &options).unwrap());
    });
}

fn bench_resolve_skip_integrity(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    write_large_tree(dir.path());
    let options = ResolveOptions {
        categories: vec!["*".to_owned()],
        singles: Vec::new(),
        skip_integrity: true,
    };
    c.bench_function("resolve_200_modules_skip_integrity", |b| {
        b.iter(|| resolve_modules(dir.path(), &options).unwrap());
    });
}

criterion_group!(benches, bench_resolve_verified, bench_resolve_skip_integrity);
criterion_main!(benches);
