use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tw_average::agent::router::EntityRouter;
use tw_average::export::health::HealthMetrics;
use tw_average::sensor::{AverageMethod, AverageSensor, RawValue, SensorInfo, SensorSettings};

const SOURCES: usize = 8;
const SAMPLES_PER_SOURCE: i64 = 256;

fn at(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
}

fn entities() -> Vec<String> {
    (0..SOURCES).map(|i| format!("sensor.source_{i}")).collect()
}

fn build_sensor(method: AverageMethod) -> AverageSensor {
    let mut settings = SensorSettings::new(SensorInfo::new("bench", entities()));
    settings.method = method;
    settings.extremas = true;
    AverageSensor::new(settings).expect("sensor")
}

fn filled_sensor(method: AverageMethod) -> AverageSensor {
    let sensor = build_sensor(method);
    for (i, entity) in entities().iter().enumerate() {
        for n in 0..SAMPLES_PER_SOURCE {
            let value = RawValue::from((n as f64) * 0.5 + i as f64);
            sensor
                .ingest(entity, at(n * 200), &value)
                .expect("ingest");
        }
    }
    sensor
}

fn bench_ingest(c: &mut Criterion) {
    let health = Arc::new(HealthMetrics::new().expect("metrics"));
    let numeric = RawValue::from(230.5);
    let text = RawValue::from("230.5");

    let fresh_router = || {
        EntityRouter::new(
            vec![Arc::new(build_sensor(AverageMethod::TimeWeighted))],
            Arc::clone(&health),
        )
    };

    c.bench_function("router/ingest_number", |b| {
        b.iter_batched_ref(
            fresh_router,
            |router| router.ingest(black_box("sensor.source_3"), at(0), black_box(&numeric)),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("router/ingest_text", |b| {
        b.iter_batched_ref(
            fresh_router,
            |router| router.ingest(black_box("sensor.source_3"), at(0), black_box(&text)),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("raw_value/parse_text", |b| {
        b.iter(|| black_box(&text).parse())
    });
}

fn bench_tick(c: &mut Criterion) {
    let now = at(SAMPLES_PER_SOURCE * 200);

    c.bench_function("sensor/tick_time_weighted", |b| {
        b.iter_batched(
            || filled_sensor(AverageMethod::TimeWeighted),
            |sensor| black_box(sensor.tick(now)),
            BatchSize::SmallInput,
        )
    });

    c.bench_function("sensor/tick_linear", |b| {
        b.iter_batched(
            || filled_sensor(AverageMethod::Linear),
            |sensor| black_box(sensor.tick(now)),
            BatchSize::SmallInput,
        )
    });
}

fn bench_suite(c: &mut Criterion) {
    bench_ingest(c);
    bench_tick(c);
}

criterion_group!(benches, bench_suite);
criterion_main!(benches);
