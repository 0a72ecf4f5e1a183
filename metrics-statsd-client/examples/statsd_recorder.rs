use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_statsd_client::StatsdBuilder;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

fn main() {
    tracing_subscriber::fmt::init();

    StatsdBuilder::default()
        .with_host("localhost")
        .with_port(9125)
        .with_batching(true)
        .install_recorder()
        .expect("failed to install StatsD recorder");

    counter!("idle_metric").increment(1);
    gauge!("testing").set(42.0);

    let server_loops = counter!("tcp_server_loops", "system" => "foo");
    let server_loops_delta_secs = histogram!("tcp_server_loop_delta_secs", "system" => "foo");

    let mut rng = Xoshiro256StarStar::from_rng(&mut rand::rng());

    // Loop over and over, pretending to do some work.
    loop {
        server_loops.increment(1);
        server_loops_delta_secs.record(rng.random_range(0.0..1.0));

        let gauge = gauge!("lucky_iterations");
        if rng.random_bool(0.75) {
            gauge.increment(1.0);
        } else {
            gauge.decrement(1.0);
        }

        std::thread::sleep(Duration::from_millis(10));
    }
}
