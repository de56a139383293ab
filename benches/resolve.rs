use anvil_di::{per_container, Container, TypeMeta};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

struct Config {
    url: String,
}

struct Client {
    config: Arc<Config>,
}

fn build_container() -> Container {
    let container = Container::new();
    container.register_meta(
        TypeMeta::of::<Config>()
            .ctor0(|| Config {
                url: "pg://localhost".to_string(),
            })
            .build(),
    );
    container.register_meta(
        TypeMeta::of::<Client>()
            .ctor1::<Arc<Config>>(["config"], |config| Client { config })
            .build(),
    );
    container.register_with::<Config, Config>(None, Some(per_container()), |c| c);
    container.register::<Client, Client>(|c| c);
    container
}

fn bench_resolution(c: &mut Criterion) {
    let container = build_container();
    // Warm the compiled-delegate table.
    container.get::<Client>().unwrap();

    c.bench_function("resolve_per_container", |b| {
        b.iter(|| black_box(container.get::<Config>().unwrap()))
    });

    c.bench_function("resolve_transient_with_dependency", |b| {
        b.iter(|| black_box(container.get::<Client>().unwrap()))
    });

    c.bench_function("resolve_named", |b| {
        let container = Container::new();
        container.register_instance_named("port", Arc::new(8080u16));
        container.get_named::<u16>("port").unwrap();
        b.iter(|| black_box(container.get_named::<u16>("port").unwrap()))
    });
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
