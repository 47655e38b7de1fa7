use admission::config::{AdmissionConfig, RateLimitingConfig};
use admission::rate_limit::{
    AdmissionController, ClientKey, IdentityResolver, PolicyEntry, RequestIdentity, StoreKey,
    WindowCounter,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn benchmark_check_and_increment(c: &mut Criterion) {
    let counter = WindowCounter::in_memory();
    let key = StoreKey::new(&ClientKey::user("bench"), "/api/generate");
    let policy = PolicyEntry::new(u32::MAX, 3600);

    c.bench_function("check_and_increment_single_key", |b| {
        b.iter(|| black_box(counter.check_and_increment(&key, policy)))
    });
}

fn benchmark_counter_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_scale");

    for num_clients in [100, 1_000, 10_000].iter() {
        let counter = WindowCounter::in_memory();
        let keys: Vec<StoreKey> = (0..*num_clients)
            .map(|i| StoreKey::new(&ClientKey::user(&i.to_string()), "/api/export"))
            .collect();
        let policy = PolicyEntry::new(u32::MAX, 3600);

        group.bench_with_input(
            BenchmarkId::from_parameter(num_clients),
            num_clients,
            |b, &_num| {
                let mut i = 0;
                b.iter(|| {
                    i = (i + 1) % keys.len();
                    black_box(counter.check_and_increment(&keys[i], policy))
                })
            },
        );
    }
    group.finish();
}

fn benchmark_identity_resolution(c: &mut Criterion) {
    let resolver = IdentityResolver::new(64);
    let v4 = RequestIdentity {
        source_ip: Some("203.0.113.77".parse().unwrap()),
        ..Default::default()
    };
    let v6 = RequestIdentity {
        source_ip: Some("2001:db8:85a3::8a2e:370:7334".parse().unwrap()),
        ..Default::default()
    };
    let api_key = RequestIdentity {
        authorization: Some("Bearer sk_live_0123456789abcdef".to_string()),
        ..Default::default()
    };

    c.bench_function("resolve_ipv4", |b| b.iter(|| black_box(resolver.resolve(&v4))));
    c.bench_function("resolve_ipv6", |b| b.iter(|| black_box(resolver.resolve(&v6))));
    c.bench_function("resolve_api_key", |b| {
        b.iter(|| black_box(resolver.resolve(&api_key)))
    });
}

fn benchmark_admit(c: &mut Criterion) {
    let controller = AdmissionController::new(&RateLimitingConfig::default());
    let identity = RequestIdentity {
        api_key: Some("enterprise-bench-key".to_string()),
        ..Default::default()
    };

    c.bench_function("admit_default_policy", |b| {
        b.iter(|| black_box(controller.admit(&identity, "/api/users")))
    });
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let yaml = r#"
server:
  host: "0.0.0.0"
  port: 8080

upstream:
  url: "http://localhost:3000"

rate_limiting:
  skip_failed_requests: true
  policies:
    anonymous:
      generate: { limit: 5, window_secs: 3600 }
      default: { limit: 30, window_secs: 60 }
    pro:
      generate: { limit: 100, window_secs: 3600 }
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| black_box(AdmissionConfig::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_check_and_increment,
    benchmark_counter_scale,
    benchmark_identity_resolution,
    benchmark_admit,
    benchmark_config_parsing
);
criterion_main!(benches);
