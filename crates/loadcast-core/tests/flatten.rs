use chrono::{Duration, NaiveDateTime};
use loadcast_core::axis::TimestampAxis;
use loadcast_core::config::{ForecastConfig, TIMESTAMP_FORMAT};
use loadcast_core::quantiles::{entity_id, flatten_file, flatten_records, output_name, FlattenError};
use loadcast_parser::{parse_quantile_lines, QuantileRecord};

fn fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../loadcast-parser/tests/data")
        .join(name);
    std::fs::read_to_string(path).expect("read fixture")
}

fn two_point_axis() -> TimestampAxis {
    let start = NaiveDateTime::parse_from_str("2014-09-01 00:00:00", TIMESTAMP_FORMAT).unwrap();
    TimestampAxis::new(start, start + Duration::hours(2), Duration::hours(2)).unwrap()
}

#[test]
fn flatten_creates_one_row_per_entity_and_step() {
    let records = parse_quantile_lines(&fixture("forecast_sample.json.out")).unwrap();
    let axis = TimestampAxis::from_config(&ForecastConfig::default()).unwrap();

    let df = flatten_records(&records, &axis, "MT").expect("flatten failed");

    assert_eq!(df.height(), records.len() * axis.len());
    assert_eq!(df.height(), 3 * 84);
    assert_eq!(
        df.get_column_names()
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>(),
        vec!["entity_id", "timestamp", "p10", "p50", "p90"]
    );

    let ids = df.column("entity_id").unwrap().str().unwrap();
    assert_eq!(ids.get(0), Some("MT001"));
    assert_eq!(ids.get(83), Some("MT001"));
    assert_eq!(ids.get(84), Some("MT002"));
    assert_eq!(ids.get(251), Some("MT003"));

    let timestamps = df.column("timestamp").unwrap().str().unwrap();
    assert_eq!(timestamps.get(0), Some("2014-09-01 00:00:00"));
    assert_eq!(timestamps.get(83), Some("2014-09-07 22:00:00"));
    assert_eq!(timestamps.get(84), Some("2014-09-01 00:00:00"));

    let p90 = df.column("p90").unwrap().f64().unwrap();
    assert_eq!(p90.get(85), Some(22.25));
}

#[test]
fn single_line_against_two_point_axis() {
    let records =
        parse_quantile_lines(r#"{"quantiles":{"0.1":[1,2],"0.5":[2,3],"0.9":[3,4]}}"#).unwrap();
    let df = flatten_records(&records, &two_point_axis(), "MT").unwrap();

    assert_eq!(df.height(), 2);
    let ids = df.column("entity_id").unwrap().str().unwrap();
    assert_eq!(ids.get(0), Some("MT001"));
    assert_eq!(ids.get(1), Some("MT001"));
    let timestamps = df.column("timestamp").unwrap().str().unwrap();
    assert_eq!(timestamps.get(0), Some("2014-09-01 00:00:00"));
    assert_eq!(timestamps.get(1), Some("2014-09-01 02:00:00"));
    let p50 = df.column("p50").unwrap().f64().unwrap();
    assert_eq!(p50.get(1), Some(3.0));
}

#[test]
fn horizon_mismatch_fails_fast() {
    let records = vec![QuantileRecord {
        p10: vec![1.0, 2.0, 3.0],
        p50: vec![1.0, 2.0, 3.0],
        p90: vec![1.0, 2.0, 3.0],
    }];
    let err = flatten_records(&records, &two_point_axis(), "MT").unwrap_err();
    assert!(matches!(
        err,
        FlattenError::AxisLengthMismatch {
            line_index: 1,
            label: "0.1",
            expected: 2,
            found: 3,
        }
    ));

    let ragged = vec![
        QuantileRecord {
            p10: vec![1.0, 2.0],
            p50: vec![1.0, 2.0],
            p90: vec![1.0, 2.0],
        },
        QuantileRecord {
            p10: vec![1.0, 2.0],
            p50: vec![1.0],
            p90: vec![1.0, 2.0],
        },
    ];
    let err = flatten_records(&ragged, &two_point_axis(), "MT").unwrap_err();
    assert!(matches!(
        err,
        FlattenError::AxisLengthMismatch {
            line_index: 2,
            label: "0.5",
            ..
        }
    ));
}

#[test]
fn entity_ids_are_zero_padded() {
    assert_eq!(entity_id("MT", 1), "MT001");
    assert_eq!(entity_id("MT", 42), "MT042");
    assert_eq!(entity_id("MT", 370), "MT370");
    assert_eq!(entity_id("HH", 1000), "HH1000");
}

#[test]
fn output_name_drops_last_extension() {
    let name = output_name(std::path::Path::new("/tmp/json/test.json.out")).unwrap();
    assert_eq!(name, "test.json.csv");
    assert!(output_name(std::path::Path::new("/")).is_err());
}

#[test]
fn flatten_file_writes_csv_per_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("test.json.out");
    std::fs::write(&input, fixture("forecast_sample.json.out")).unwrap();
    let axis = TimestampAxis::from_config(&ForecastConfig::default()).unwrap();

    let summary = flatten_file(&input, dir.path(), &axis, "MT").unwrap();

    assert_eq!(summary.entities, 3);
    assert_eq!(summary.rows, 252);
    assert_eq!(summary.output, dir.path().join("test.json.csv"));

    let csv = std::fs::read_to_string(&summary.output).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("entity_id,timestamp,p10,p50,p90"));
    assert!(lines
        .next()
        .unwrap()
        .starts_with("MT001,2014-09-01 00:00:00,"));
    assert_eq!(csv.lines().count(), 253);
}

#[test]
fn empty_forecast_file_writes_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("empty.json.out");
    std::fs::write(&input, "").unwrap();

    let summary = flatten_file(&input, dir.path(), &two_point_axis(), "MT").unwrap();

    assert_eq!(summary.rows, 0);
    let csv = std::fs::read_to_string(&summary.output).unwrap();
    assert_eq!(csv.trim_end(), "entity_id,timestamp,p10,p50,p90");
}
