//! Example inspection tool.
//!
//! Attaches to a running pipeline's status region and gets or sets a single
//! keyword:
//!
//! ```text
//! peek <instance_id> get <KEYWORD>
//! peek <instance_id> getd <KEYWORD>
//! peek <instance_id> set <KEYWORD> <VALUE>
//! peek <instance_id> setd <KEYWORD> <NUMBER>
//! ```

use statusbuf::{SessionConfig, StatusSession};
use std::time::Duration;

fn usage() -> ! {
    eprintln!("usage: peek <instance_id> get|getd <KEYWORD>");
    eprintln!("       peek <instance_id> set|setd <KEYWORD> <VALUE>");
    std::process::exit(2);
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        usage();
    }

    let instance_id: u32 = match args[0].parse() {
        Ok(id) => id,
        Err(_) => usage(),
    };

    let session = match StatusSession::attach_with(SessionConfig {
        instance_id,
        key: std::env::var("STATUSBUF_KEY").ok(),
        lock_timeout: Some(Duration::from_secs(2)),
    }) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("[peek] failed to attach: {}", e);
            eprintln!("[peek] is the pipeline running?");
            std::process::exit(1);
        }
    };

    let keyword = &args[2];
    let result = match (args[1].as_str(), args.get(3)) {
        ("get", None) => session.get_string(keyword).map(|v| println!("{}", v)),
        ("getd", None) => session.get_double(keyword).map(|v| match v {
            Some(x) => println!("{}", x),
            None => println!("(not set)"),
        }),
        ("set", Some(value)) => session.set_string(keyword, value),
        ("setd", Some(value)) => match value.parse::<f64>() {
            Ok(x) => session.set_double(keyword, x),
            Err(_) => {
                eprintln!("[peek] not a number: {}", value);
                std::process::exit(2);
            }
        },
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("[peek] {}", e);
        std::process::exit(1);
    }
}
