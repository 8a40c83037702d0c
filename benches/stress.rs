use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Days, Utc};
use rust_decimal_macros::dec;
use ulid::Ulid;

use frontdesk::engine::Engine;
use frontdesk::model::{BookingOutcome, BookingRequest, BookingTarget, StayRange};

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    if latencies.is_empty() {
        println!("  {label}: no samples");
        return;
    }
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies[latencies.len() - 1].as_secs_f64() * 1000.0,
    );
}

/// Stay of `nights` starting `offset` days after tomorrow.
fn stay(offset: i64, nights: i64) -> StayRange {
    let start = Utc::now().date_naive() + Days::new(1 + offset as u64);
    StayRange::new(start, start + Days::new(nights as u64)).unwrap()
}

fn request(category_id: Ulid, stay: StayRange) -> BookingRequest {
    BookingRequest {
        category_id,
        room_id: None,
        guest_id: Ulid::new(),
        stay,
        guests: 2,
        extras: Default::default(),
    }
}

async fn open_engine(name: &str) -> Arc<Engine> {
    let dir = std::env::temp_dir().join("frontdesk_bench");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{name}-{}.wal", Ulid::new()));
    Arc::new(Engine::new(path).unwrap())
}

async fn category_with_rooms(engine: &Engine, rooms: usize) -> Ulid {
    let id = Ulid::new();
    engine
        .create_category(id, format!("Category {id}"), dec!(120), 4)
        .await
        .unwrap();
    for i in 0..rooms {
        engine.add_room(Ulid::new(), id, format!("{:04}", i + 1)).await.unwrap();
    }
    id
}

async fn phase1_sequential() {
    let engine = open_engine("sequential").await;
    let category = category_with_rooms(&engine, 1).await;

    // Back-to-back stays with a gap day (same-day turnover conflicts).
    let n = 300;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();
    for i in 0..n {
        let t = Instant::now();
        let outcome = engine
            .create_booking(request(category, stay(i as i64 * 3, 2)), None)
            .await
            .unwrap();
        latencies.push(t.elapsed());
        assert!(matches!(outcome, BookingOutcome::Accepted(_)));
    }
    let elapsed = start.elapsed();
    println!(
        "  {n} bookings in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("create latency", &mut latencies);
}

async fn phase2_concurrent() {
    let engine = open_engine("concurrent").await;
    let n_categories = 10;
    let n_per_task = 100;
    let mut categories = Vec::new();
    for _ in 0..n_categories {
        categories.push(category_with_rooms(&engine, 5).await);
    }

    let start = Instant::now();
    let mut handles = Vec::new();
    for category in categories {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..n_per_task {
                engine
                    .create_booking(request(category, stay(j as i64 * 3, 2)), None)
                    .await
                    .unwrap();
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let elapsed = start.elapsed();
    let total = n_categories * n_per_task;
    println!(
        "  {n_categories} tasks x {n_per_task} bookings = {total} in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
}

async fn phase3_contention() {
    let engine = open_engine("contention").await;
    let rooms = 5;
    let category = category_with_rooms(&engine, rooms).await;
    let contenders = 200;

    let accepted = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    let start = Instant::now();
    for _ in 0..contenders {
        let engine = engine.clone();
        let accepted = accepted.clone();
        handles.push(tokio::spawn(async move {
            if let BookingOutcome::Accepted(_) = engine
                .create_booking(request(category, stay(10, 3)), None)
                .await
                .unwrap()
            {
                accepted.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let won = accepted.load(Ordering::Relaxed);
    println!(
        "  {contenders} requests for {rooms} rooms: {won} accepted in {:.2}s",
        start.elapsed().as_secs_f64()
    );
    assert_eq!(won, rooms, "overbooked or underbooked");
}

async fn phase4_reads_under_load() {
    let engine = open_engine("reads").await;
    let busy = category_with_rooms(&engine, 10).await;
    let quiet = category_with_rooms(&engine, 10).await;
    for i in 0..200 {
        engine
            .create_booking(request(quiet, stay(i * 3, 2)), None)
            .await
            .unwrap();
    }

    let stop = Arc::new(AtomicBool::new(false));
    let mut writers = Vec::new();
    for w in 0..4 {
        let engine = engine.clone();
        let stop = stop.clone();
        writers.push(tokio::spawn(async move {
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let _ = engine
                    .create_booking(request(busy, stay((w * 100_000 + i) % 1000, 1)), None)
                    .await;
                i += 1;
            }
        }));
    }

    let mut readers = Vec::new();
    for r in 0..8 {
        let engine = engine.clone();
        readers.push(tokio::spawn(async move {
            let mut latencies = Vec::with_capacity(500);
            for i in 0..500 {
                let t = Instant::now();
                engine
                    .is_available(BookingTarget::Category(quiet), &stay((r * 37 + i) % 600, 3), None)
                    .await
                    .unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in readers {
        all.extend(h.await.unwrap());
    }
    stop.store(true, Ordering::Relaxed);
    for h in writers {
        let _ = h.await;
    }
    print_latency("availability query", &mut all);
}

async fn phase5_compaction() {
    let engine = open_engine("compaction").await;
    let category = category_with_rooms(&engine, 3).await;
    for i in 0..300 {
        if let BookingOutcome::Accepted(b) = engine
            .create_booking(request(category, stay(i * 3, 2)), None)
            .await
            .unwrap()
            && i % 2 == 0
        {
            engine.cancel_booking(b.id, None, None).await.unwrap();
        }
    }
    let appends = engine.wal_appends_since_compact().await;
    let t = Instant::now();
    engine.compact_wal().await.unwrap();
    println!("  compacted {appends} appends in {:.2}ms", t.elapsed().as_secs_f64() * 1000.0);
}

#[tokio::main]
async fn main() {
    println!("=== frontdesk stress benchmark ===\n");

    println!("[phase 1] sequential create throughput");
    phase1_sequential().await;

    println!("\n[phase 2] concurrent creates across categories");
    phase2_concurrent().await;

    println!("\n[phase 3] contention for the last rooms");
    phase3_contention().await;

    println!("\n[phase 4] availability reads under write load");
    phase4_reads_under_load().await;

    println!("\n[phase 5] compaction");
    phase5_compaction().await;

    println!("\n=== done ===");
}
