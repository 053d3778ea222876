//! End-to-end properties of the status buffer access layer.
//!
//! Cross-process behavior is exercised with multiple in-process sessions:
//! each session is an independent attach to the same region, which is the
//! same code path a second process would take.

use statusbuf::{RegionOwner, SessionConfig, StatusError, StatusSession};
use std::time::Duration;

/// Per-test region key so parallel tests never share a segment.
fn sandbox(tag: &str) -> String {
    format!("it_{}_{}", tag, std::process::id())
}

fn attach(instance_id: u32, key: &str) -> statusbuf::Result<StatusSession> {
    StatusSession::attach_with(SessionConfig {
        instance_id,
        key: Some(key.to_string()),
        lock_timeout: Some(Duration::from_secs(5)),
    })
}

#[test]
fn test_instance_id_masking_resolves_same_region() {
    let key = sandbox("mask");
    let _owner = RegionOwner::create(5, Some(&key)).unwrap();

    let low = attach(5, &key).unwrap();
    let high = attach(5 + 64, &key).unwrap();
    assert_eq!(low.instance_id(), high.instance_id());

    low.set_string("WHOAMI", "low").unwrap();
    assert_eq!(high.get_string("WHOAMI").unwrap(), "low");
}

#[test]
fn test_string_round_trip_with_truncation() {
    let key = sandbox("strrt");
    let _owner = RegionOwner::create(1, Some(&key)).unwrap();
    let session = attach(1, &key).unwrap();

    session.set_string("OBSMODE", "tracking").unwrap();
    assert_eq!(session.get_string("OBSMODE").unwrap(), "tracking");

    // Over-length values are silently clipped to the card's value field.
    let long = "x".repeat(100);
    session.set_string("NOTE", &long).unwrap();
    let read = session.get_string("NOTE").unwrap();
    assert_eq!(read, long[..read.len()].to_string());
    assert!(read.len() < long.len());

    // Over-length keywords match on their truncated form.
    session.set_string("TELESCOPENAME", "dish-3").unwrap();
    assert_eq!(session.get_string("TELESCOP").unwrap(), "dish-3");
}

#[test]
fn test_double_round_trip() {
    let key = sandbox("dblrt");
    let _owner = RegionOwner::create(2, Some(&key)).unwrap();
    let session = attach(2, &key).unwrap();

    for (i, &v) in [0.0, -273.15, 0.1, 1420.405751, 1e300].iter().enumerate() {
        let kw = format!("DBL{}", i);
        session.set_double(&kw, v).unwrap();
        assert_eq!(session.get_double(&kw).unwrap(), Some(v));
    }
}

#[test]
fn test_absent_keyword_reads() {
    let key = sandbox("absent");
    let _owner = RegionOwner::create(3, Some(&key)).unwrap();
    let session = attach(3, &key).unwrap();

    // Absence is not an error: blank string, explicit None for numerics.
    assert_eq!(session.get_string("NEVERSET").unwrap(), "");
    assert_eq!(session.get_double("NEVERSET").unwrap(), None);
}

#[test]
fn test_two_sessions_observe_each_other() {
    let key = sandbox("vis");
    let _owner = RegionOwner::create(4, Some(&key)).unwrap();
    let a = attach(4, &key).unwrap();
    let b = attach(4, &key).unwrap();

    a.set_double("AZIMUTH", 1.0).unwrap();
    assert_eq!(b.get_double("AZIMUTH").unwrap(), Some(1.0));

    b.set_string("STATE", "slewing").unwrap();
    assert_eq!(a.get_string("STATE").unwrap(), "slewing");
}

#[test]
fn test_concurrent_writers_no_lost_update() {
    let key = sandbox("conc");
    let _owner = RegionOwner::create(6, Some(&key)).unwrap();

    let mut handles = Vec::new();
    for t in 0..4 {
        let key = key.clone();
        handles.push(std::thread::spawn(move || {
            let session = attach(6, &key).unwrap();
            let kw = format!("THR{}", t);
            for i in 0..200 {
                session.set_double(&kw, i as f64).unwrap();
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let session = attach(6, &key).unwrap();
    for t in 0..4 {
        let kw = format!("THR{}", t);
        assert_eq!(session.get_double(&kw).unwrap(), Some(199.0));
    }
}

#[test]
fn test_capacity_exhaustion_is_clean() {
    let key = sandbox("cap");
    let owner = RegionOwner::create(7, Some(&key)).unwrap();
    let session = attach(7, &key).unwrap();

    // Fill every data card; the last slot must stay free for the marker.
    let data_cards = statusbuf::card::REGION_CARDS - 1;
    for i in 0..data_cards {
        session.set_string(&format!("K{:06}", i), "v").unwrap();
    }
    assert_eq!(owner.cards_used().unwrap(), statusbuf::card::REGION_CARDS);

    let err = session.set_string("ONEMORE", "v").unwrap_err();
    assert!(matches!(err, StatusError::CapacityExhausted { .. }));

    // The marker survived: lookups and overwrites still behave.
    assert_eq!(session.get_string("K000000").unwrap(), "v");
    assert_eq!(session.get_string("ONEMORE").unwrap(), "");
    session.set_string("K000000", "w").unwrap();
    assert_eq!(session.get_string("K000000").unwrap(), "w");
}

#[test]
fn test_failed_attach_leaves_no_leak() {
    let key = sandbox("leak");

    let err = attach(8, &key).unwrap_err();
    assert!(matches!(err, StatusError::ShmOpen { .. }));

    // The failed attach held nothing: the same identity can be created and
    // attached normally afterwards.
    let _owner = RegionOwner::create(8, Some(&key)).unwrap();
    let session = attach(8, &key).unwrap();
    session.set_string("ALIVE", "yes").unwrap();
    assert_eq!(session.get_string("ALIVE").unwrap(), "yes");
}

#[test]
fn test_input_errors_rejected_before_locking() {
    let key = sandbox("input");
    let _owner = RegionOwner::create(9, Some(&key)).unwrap();
    let session = attach(9, &key).unwrap();

    assert!(matches!(
        session.set_string("END", "boom"),
        Err(StatusError::InvalidKeyword { .. })
    ));
    assert!(matches!(
        session.get_string(""),
        Err(StatusError::InvalidKeyword { .. })
    ));
    assert!(matches!(
        session.set_double("BAD\u{7f}KW", 1.0),
        Err(StatusError::InvalidKeyword { .. })
    ));

    // Region untouched by the rejected calls.
    assert_eq!(session.get_string("BOOM").unwrap(), "");
}

#[test]
fn test_bad_key_aborts_construction() {
    let err = StatusSession::attach_with(SessionConfig {
        instance_id: 0,
        key: Some("no/slashes".to_string()),
        lock_timeout: None,
    })
    .unwrap_err();
    assert!(matches!(err, StatusError::InvalidKey { .. }));
}
