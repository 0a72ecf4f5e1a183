use std::time::{Duration, Instant};

use metrics_statsd_client::StatsdBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let client = StatsdBuilder::default()
        .with_host("localhost")
        .with_port(9125)
        .with_prefix("example.")
        .with_global_tag("service:statsd_client")
        .with_batching(true)
        .with_max_batch_delay(Duration::from_millis(500))
        .build()
        .expect("failed to build StatsD client");

    // Loop for a while, pretending to do some work, and report what was sent once we're done.
    let started = Instant::now();
    let mut iterations = 0u64;
    while started.elapsed() < Duration::from_secs(10) {
        let work_started = Instant::now();
        std::thread::sleep(Duration::from_millis(50));
        iterations += 1;

        let _ = client.increment("iterations").send();
        let _ = client.timer("work", work_started.elapsed()).with_sample_rate(0.5).send();
        let _ = client.gauge("iterations.total", iterations).send();
        client.histogram(["work.size", "work.size.all"], iterations % 7).with_tag("kind:fake").send_with(|result| {
            if let Err(e) = result {
                eprintln!("failed to send histogram: {}", e);
            }
        });
    }

    client.close();
    println!("{:?}", client.stats());
}
