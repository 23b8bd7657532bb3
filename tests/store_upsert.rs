// tests/store_upsert.rs
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use forecast_engine::store::{FieldFilter, StoreOptions, TimeWindow};
use forecast_engine::{Field, ForecastRecord, ForecastStore, Source};

fn at(h: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::hours(h)
}

fn rec(source: Source, issued: i64, event: i64, temp: f64) -> ForecastRecord {
    let mut r = ForecastRecord::new(source, at(issued), at(event), 3);
    r.set_number(Field::Temp, Some(temp));
    r.location = Some("KBOS".into());
    r
}

fn open(dir: &tempfile::TempDir) -> ForecastStore {
    ForecastStore::open(&dir.path().join("forecast.sdb")).expect("open store")
}

#[test]
fn upsert_then_query_returns_records_in_event_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    let batch = vec![rec(Source::Owm, 0, 9, 50.0), rec(Source::Owm, 0, 3, 48.0), rec(Source::Owm, 0, 6, 49.0)];
    assert_eq!(store.upsert(&batch).unwrap(), 3);

    let got = store.query(Source::Owm, &FieldFilter::All, TimeWindow::all()).unwrap();
    let temps: Vec<_> = got.iter().map(|r| r.number(Field::Temp)).collect();
    assert_eq!(temps, vec![Some(48.0), Some(49.0), Some(50.0)]);
    assert_eq!(got[0].location.as_deref(), Some("KBOS"));
    assert_eq!(got[0].text(Field::Clouds), None);
}

#[test]
fn same_key_replaces_instead_of_duplicating() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.upsert(&[rec(Source::Wu, 0, 3, 40.0), rec(Source::Wu, 0, 6, 41.0)]).unwrap();

    let mut again = rec(Source::Wu, 0, 3, 45.0);
    again.set_text(Field::Clouds, Some("OV"));
    store.upsert(&[again]).unwrap();

    assert_eq!(store.count(Some(Source::Wu)).unwrap(), 2);
    let got = store.query(Source::Wu, &FieldFilter::All, TimeWindow::all()).unwrap();
    assert_eq!(got[0].number(Field::Temp), Some(45.0));
    assert_eq!(got[0].text(Field::Clouds), Some("OV"));
}

#[test]
fn ties_on_event_time_put_the_newest_issue_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store
        .upsert(&[rec(Source::Nws, 0, 12, 1.0), rec(Source::Nws, 6, 12, 2.0)])
        .unwrap();
    let got = store.query(Source::Nws, &FieldFilter::All, TimeWindow::all()).unwrap();
    assert_eq!(got.len(), 2);
    assert_eq!(got[0].issued_time, at(6));
    assert_eq!(got[1].issued_time, at(0));
}

#[test]
fn latest_issued_time_tracks_the_newest_batch() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store.upsert(&[rec(Source::Ukmo, 0, 3, 1.0)]).unwrap();
    store.upsert(&[rec(Source::Ukmo, 12, 15, 1.0)]).unwrap();
    assert_eq!(store.latest_issued_time(Source::Ukmo).unwrap(), Some(at(12)));
    assert_eq!(store.latest_issued_time(Source::Aeris).unwrap(), None);
}

#[test]
fn concurrent_writers_from_two_sources_both_persist() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        ForecastStore::open_with(
            &dir.path().join("forecast.sdb"),
            StoreOptions {
                max_tries: 5,
                ..StoreOptions::default()
            },
        )
        .unwrap(),
    );

    let handles: Vec<_> = [Source::Owm, Source::DarkSky]
        .into_iter()
        .map(|src| {
            let store = store.clone();
            thread::spawn(move || {
                for batch in 0..10 {
                    let recs: Vec<_> = (0..8)
                        .map(|h| rec(src, batch, batch + h, h as f64))
                        .collect();
                    store.upsert(&recs).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(store.count(Some(Source::Owm)).unwrap(), 80);
    assert_eq!(store.count(Some(Source::DarkSky)).unwrap(), 80);
    let mut sources = store.sources().unwrap();
    sources.sort();
    assert_eq!(sources, vec![Source::Owm, Source::DarkSky]);
}

#[test]
fn prune_respects_horizon_and_keeps_newest_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store
        .upsert(&[rec(Source::Aeris, 0, 0, 1.0), rec(Source::Aeris, 0, 30, 2.0), rec(Source::Aeris, 0, 60, 3.0)])
        .unwrap();
    // cutoff at hour 48
    let removed = store
        .prune_source(Source::Aeris, std::time::Duration::from_secs(24 * 3600), at(72))
        .unwrap();
    assert_eq!(removed, 2);
    let left = store.query(Source::Aeris, &FieldFilter::All, TimeWindow::all()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].event_time, at(60));

    // a source whose only records are stale keeps its newest one
    store.upsert(&[rec(Source::Wwo, 0, 0, 1.0), rec(Source::Wwo, 1, 1, 1.0)]).unwrap();
    store.prune(std::time::Duration::from_secs(3600), at(500)).unwrap();
    let left = store.query(Source::Wwo, &FieldFilter::All, TimeWindow::all()).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].issued_time, at(1));
}

#[test]
fn failing_batch_leaves_the_store_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir);
    store
        .upsert(&[rec(Source::Nws, 0, 3, 40.0), rec(Source::Nws, 0, 6, 41.0)])
        .unwrap();

    // reject one marker row from a side connection
    let side = rusqlite::Connection::open(dir.path().join("forecast.sdb")).unwrap();
    side.execute_batch(
        "CREATE TRIGGER reject_marker BEFORE INSERT ON forecast
         WHEN NEW.temp = -999
         BEGIN SELECT RAISE(ABORT, 'marker row rejected'); END;",
    )
    .unwrap();

    let batch = vec![
        rec(Source::Nws, 0, 3, 50.0),
        rec(Source::Nws, 0, 9, 51.0),
        rec(Source::Nws, 0, 12, -999.0),
    ];
    assert!(store.upsert(&batch).is_err());

    assert_eq!(store.count(Some(Source::Nws)).unwrap(), 2);
    let got = store.query(Source::Nws, &FieldFilter::All, TimeWindow::all()).unwrap();
    let temps: Vec<_> = got.iter().map(|r| r.number(Field::Temp)).collect();
    assert_eq!(temps, vec![Some(40.0), Some(41.0)]);
    assert_eq!(store.latest_issued_time(Source::Nws).unwrap(), Some(at(0)));
}
