//! Example owner process.
//!
//! Creates a status region the way the pipeline would, then publishes a
//! heartbeat once a second. Point the `peek` example at the same instance id
//! to watch it from another process.

use statusbuf::RegionOwner;
use std::time::{Duration, Instant};

fn main() {
    let instance_id: u32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    println!("[pipeline] creating status region for instance {}", instance_id);
    let owner = match RegionOwner::create(instance_id, None) {
        Ok(o) => o,
        Err(e) => {
            eprintln!("[pipeline] failed to create region: {}", e);
            std::process::exit(1);
        }
    };

    let session = owner.session().expect("attach to own region");
    session.set_string("OBSMODE", "idle").unwrap();

    println!("[pipeline] publishing; ctrl-c to stop");
    let started = Instant::now();
    let mut beats = 0u64;
    loop {
        beats += 1;
        session.set_double("HEARTBT", beats as f64).unwrap();
        session
            .set_double("ELAPSED", started.elapsed().as_secs_f64())
            .unwrap();
        if beats % 10 == 0 {
            println!(
                "[pipeline] {} beats, {} cards in use",
                beats,
                owner.cards_used().unwrap()
            );
        }
        std::thread::sleep(Duration::from_secs(1));
    }
}
