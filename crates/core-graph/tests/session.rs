//! Session persistence: a connected pool survives a save/load cycle, its
//! edges re-resolve, and a single reload pushes a frame end to end.

use core_archive::{ArchiveReader, ArchiveWriter};
use core_data::AnyData;
use core_graph::persist::{load_pool, save_pool};
use core_graph::{Node, OpenMode, Pool, ScheduleStrategy, ops};
use std::fs::File;
use std::io::{BufReader, BufWriter};

fn build_session_pool(name: &str) -> std::sync::Arc<Pool> {
    ops::register_builtin_infos();
    let pool = Pool::new(name);

    let reader = core_graph::registry()
        .create_node("SignalGenerator")
        .expect("generator factory");
    reader.set_name("reader");
    reader.initialize();

    let filter = core_graph::registry()
        .create_node("Scaling")
        .expect("scaling factory");
    filter.set_name("filter");
    // Asynchronous so a pushed frame schedules the filter by itself.
    filter.set_schedule(ScheduleStrategy::ONE_INPUT | ScheduleStrategy::ASYNCHRONOUS);
    filter.initialize();
    filter
        .property_named("factor")
        .unwrap()
        .set_data(AnyData::untimed(2.0f64));

    pool.add(reader.clone());
    pool.add(filter.clone());
    Node::connect(&reader, 0, &filter, 0).unwrap();
    pool
}

#[test]
fn save_load_reconnect_and_propagate() {
    let pool = build_session_pool("session-src");

    // The live connection is canonical: pool-qualified address on the
    // filter's input.
    let filter = pool.find("filter").unwrap();
    let address = filter
        .input_at(0)
        .unwrap()
        .connection()
        .lock()
        .unwrap()
        .address()
        .unwrap()
        .to_string();
    assert_eq!(address, "session-src;reader;output");

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.parc");
    {
        let file = BufWriter::new(File::create(&path).unwrap());
        let mut archive = ArchiveWriter::new(file);
        save_pool(&mut archive, &pool).unwrap();
        archive.finish().unwrap();
    }
    drop(pool);

    let loaded = {
        let file = BufReader::new(File::open(&path).unwrap());
        let mut archive = ArchiveReader::new(file);
        load_pool(&mut archive).unwrap()
    };
    assert_eq!(loaded.len(), 2);
    let reader = loaded.find("reader").expect("reader restored");
    let filter = loaded.find("filter").expect("filter restored");
    assert_eq!(
        filter
            .property_named("factor")
            .unwrap()
            .data()
            .value()
            .as_f64(),
        Some(2.0),
        "property values restored"
    );

    // Addresses are recorded but unresolved until the bulk re-open.
    assert_eq!(
        Pool::connection_mode(&filter, 0),
        OpenMode::Unknown,
        "load keeps connections closed"
    );
    let opened = loaded.open_all_connections();
    assert_eq!(opened, 1);
    assert_eq!(Pool::connection_mode(&filter, 0), OpenMode::Input);

    // The input's source points back at the reader's output.
    let input = filter.input_at(0).unwrap();
    let conn = input.connection().lock().unwrap();
    let src = conn.peers()[0].upgrade().unwrap();
    assert!(std::sync::Arc::ptr_eq(&src, &reader));
    drop(conn);

    // One reload on the source pushes one frame through the graph.
    assert!(reader.reload());
    assert!(filter.wait(false, Some(std::time::Duration::from_secs(10))));
    let out = filter.output_at(0).unwrap().data();
    let generated = reader.output_at(0).unwrap().data();
    let expected = generated.value().as_f64().unwrap() * 2.0;
    assert!((out.value().as_f64().unwrap() - expected).abs() < 1e-12);
}

#[test]
fn unresolvable_address_reports_connection_not_open() {
    ops::register_builtin_infos();
    let pool = Pool::new("session-broken");
    let orphan = Node::new(ops::Scaling);
    orphan.set_name("orphan");
    orphan.initialize();
    {
        let input = orphan.input_at(0).unwrap();
        let mut conn = input.connection().lock().unwrap();
        conn.set_address(Some("session-broken;missing;output".to_string()));
    }
    pool.add(orphan.clone());
    assert_eq!(pool.open_all_connections(), 0);
    assert_eq!(Pool::connection_mode(&orphan, 0), OpenMode::Unknown);
    let err = orphan.last_error().expect("error recorded");
    assert_eq!(err.code, core_graph::ErrorCode::ConnectionNotOpen);
}

#[test]
fn schedule_bits_survive_round_trip() {
    let pool = build_session_pool("session-sched");
    let reader = pool.find("reader").unwrap();
    reader.set_schedule(
        ScheduleStrategy::ONE_INPUT
            | ScheduleStrategy::ASYNCHRONOUS
            | ScheduleStrategy::SKIP_IF_BUSY,
    );

    let mut buf = std::io::Cursor::new(Vec::new());
    {
        let mut archive = ArchiveWriter::new(&mut buf);
        save_pool(&mut archive, &pool).unwrap();
        archive.flush().unwrap();
    }
    drop(pool);
    buf.set_position(0);
    let loaded = {
        let mut archive = ArchiveReader::new(&mut buf);
        load_pool(&mut archive).unwrap()
    };
    let reader = loaded.find("reader").unwrap();
    assert!(reader.schedule().contains(ScheduleStrategy::ASYNCHRONOUS));
    assert!(reader.schedule().contains(ScheduleStrategy::SKIP_IF_BUSY));
}
