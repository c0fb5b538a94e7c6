use chrono::NaiveDateTime;
use loadcast_core::config::{ConfigError, TestWindowOffset, WindowConfig, TIMESTAMP_FORMAT};
use loadcast_core::resample::{naive_from_micros, resample_sum};
use loadcast_core::windowing::{run_windowing, window_table, WindowError, TEST_FILE, TRAIN_FILE};
use loadcast_parser::parse_wide_table;

fn fixture(name: &str) -> String {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../loadcast-parser/tests/data")
        .join(name);
    std::fs::read_to_string(path).expect("read fixture")
}

fn ts(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).unwrap()
}

fn fixture_config(test_offset: TestWindowOffset) -> WindowConfig {
    WindowConfig {
        start_dataset: ts("2014-01-01 00:00:00"),
        end_training: ts("2014-01-02 12:00:00"),
        prediction_length: 2,
        num_test_windows: 2,
        test_offset,
        ..WindowConfig::default()
    }
}

#[test]
fn resampling_sums_quarter_hours_into_two_hour_buckets() {
    let table = parse_wide_table(&fixture("LD_sample.txt")).unwrap();
    let config = WindowConfig::default();
    let resampled = resample_sum(&table, config.cadence(), config.scale_divisor).unwrap();

    assert_eq!(resampled.bucket_starts.len(), 25);
    assert_eq!(
        naive_from_micros(resampled.bucket_starts[0]).unwrap(),
        ts("2014-01-01 00:00:00")
    );
    assert_eq!(
        naive_from_micros(resampled.bucket_starts[24]).unwrap(),
        ts("2014-01-03 00:00:00")
    );

    let (name, household) = &resampled.columns[1];
    assert_eq!(name, "MT_002");
    // 00:15..01:45 land in the first bucket, 00:00 of the last day stands alone.
    assert_eq!(household[0], 7.0 * 1.25 / 8.0);
    assert_eq!(household[1], 1.25);
    assert_eq!(household[24], 1.25 / 8.0);
}

#[test]
fn training_windows_match_entity_columns() {
    let table = parse_wide_table(&fixture("LD_sample.txt")).unwrap();
    let (dataset, series) = window_table(&table, &fixture_config(TestWindowOffset::Buckets)).unwrap();

    assert_eq!(dataset.train.len(), table.entity_count());
    assert_eq!(dataset.test.len(), 2 * table.entity_count());
    assert!(dataset
        .train
        .iter()
        .chain(dataset.test.iter())
        .all(|window| window.start == "2014-01-01 00:00:00"));

    let names: Vec<&str> = series.iter().map(|entity| entity.name.as_str()).collect();
    assert_eq!(names, vec!["MT_001", "MT_002", "MT_003"]);
}

#[test]
fn leading_zeros_are_trimmed_and_all_zero_entity_is_empty() {
    let table = parse_wide_table(&fixture("LD_sample.txt")).unwrap();
    let (dataset, series) = window_table(&table, &fixture_config(TestWindowOffset::Buckets)).unwrap();

    // MT_001 turns on at 10:15; its first bucket is 10:00.
    assert_eq!(
        naive_from_micros(series[0].timestamps[0]).unwrap(),
        ts("2014-01-01 10:00:00")
    );
    assert_eq!(dataset.train[0].target, vec![7.0 * 2.5 / 8.0, 2.5]);

    assert_eq!(dataset.train[1].target.len(), 7);
    assert_eq!(dataset.train[1].target[0], 7.0 * 1.25 / 8.0);

    assert!(series[2].values.is_empty());
    assert!(dataset.train[2].target.is_empty());
    assert!(dataset.test[2].target.is_empty());
}

#[test]
fn bucket_offsets_grow_each_test_window() {
    let table = parse_wide_table(&fixture("LD_sample.txt")).unwrap();
    let (dataset, _) = window_table(&table, &fixture_config(TestWindowOffset::Buckets)).unwrap();

    // window-major, entity-minor
    let first = &dataset.test[1];
    let second = &dataset.test[4];
    assert_eq!(dataset.train[1].target.len(), 7);
    assert_eq!(first.target.len(), 21);
    assert_eq!(second.target.len(), 23);
    assert_eq!(dataset.test[0].target.len(), 16);
    assert!(dataset.train[1].target.len() < first.target.len());
    assert!(first.target.len() < second.target.len());
}

#[test]
fn calendar_day_offsets_run_past_the_data_and_keep_trailing_values() {
    let table = parse_wide_table(&fixture("LD_sample.txt")).unwrap();
    let (dataset, _) =
        window_table(&table, &fixture_config(TestWindowOffset::CalendarDays)).unwrap();

    let first = &dataset.test[1];
    let second = &dataset.test[4];
    assert_eq!(first.target.len(), 25);
    assert_eq!(second.target, first.target);
    assert_eq!(*first.target.last().unwrap(), 1.25 / 8.0);
}

#[test]
fn trims_per_entity_at_two_hour_cadence() {
    let content = "\
\"\";\"MT_001\";\"MT_002\"
\"2014-01-01 00:00:00\";0;0
\"2014-01-01 02:00:00\";0;1
\"2014-01-01 04:00:00\";1;2
\"2014-01-01 06:00:00\";2;3
";
    let table = parse_wide_table(content).unwrap();
    let config = WindowConfig {
        end_training: ts("2014-01-03 00:00:00"),
        ..WindowConfig::default()
    };
    let (dataset, series) = window_table(&table, &config).unwrap();

    assert_eq!(
        naive_from_micros(series[0].timestamps[0]).unwrap(),
        ts("2014-01-01 04:00:00")
    );
    assert_eq!(
        naive_from_micros(series[1].timestamps[0]).unwrap(),
        ts("2014-01-01 02:00:00")
    );
    assert_eq!(dataset.train[0].target, vec![0.125, 0.25]);
    assert_eq!(dataset.train[1].target, vec![0.125, 0.25, 0.375]);
}

#[test]
fn trailing_zeros_are_retained() {
    let content = "\
\"\";\"MT_001\"
\"2014-01-01 00:00:00\";0
\"2014-01-01 02:00:00\";8
\"2014-01-01 04:00:00\";0
\"2014-01-01 06:00:00\";0
";
    let table = parse_wide_table(content).unwrap();
    let config = WindowConfig {
        end_training: ts("2014-01-03 00:00:00"),
        ..WindowConfig::default()
    };
    let (dataset, _) = window_table(&table, &config).unwrap();
    assert_eq!(dataset.train[0].target, vec![1.0, 0.0, 0.0]);
}

#[test]
fn windowing_writes_identical_files_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("LD_sample.txt");
    std::fs::write(&input, fixture("LD_sample.txt")).unwrap();
    let config = fixture_config(TestWindowOffset::CalendarDays);

    let first_dir = dir.path().join("first");
    let second_dir = dir.path().join("second");
    std::fs::create_dir_all(&first_dir).unwrap();
    std::fs::create_dir_all(&second_dir).unwrap();

    let summary = run_windowing(&input, &first_dir, &config).unwrap();
    run_windowing(&input, &second_dir, &config).unwrap();

    assert_eq!(summary.entity_count, 3);
    assert_eq!(summary.empty_entities, vec!["MT_003".to_string()]);
    for name in [TRAIN_FILE, TEST_FILE] {
        let a = std::fs::read(first_dir.join(name)).unwrap();
        let b = std::fs::read(second_dir.join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }

    let train = std::fs::read_to_string(first_dir.join(TRAIN_FILE)).unwrap();
    let lines: Vec<&str> = train.lines().collect();
    assert_eq!(lines.len(), 3);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["start"], "2014-01-01 00:00:00");
    assert_eq!(first["target"].as_array().unwrap().len(), 2);

    let test = std::fs::read_to_string(first_dir.join(TEST_FILE)).unwrap();
    assert_eq!(test.lines().count(), 6);
}

#[test]
fn malformed_input_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.txt");
    std::fs::write(&input, "\"\";\"MT_001\"\n\"2014-01-01 00:15:00\";x\n").unwrap();

    let result = run_windowing(&input, dir.path(), &WindowConfig::default());
    assert!(result.is_err());
    assert!(!dir.path().join(TRAIN_FILE).exists());
}

#[test]
fn unrepresentable_test_window_end_is_a_config_error() {
    let table = parse_wide_table(&fixture("LD_sample.txt")).unwrap();

    let calendar = WindowConfig {
        prediction_length: 1_000_000_000,
        ..fixture_config(TestWindowOffset::CalendarDays)
    };
    assert!(matches!(
        window_table(&table, &calendar),
        Err(WindowError::Config(ConfigError::Invalid(_)))
    ));

    let buckets = WindowConfig {
        cadence_minutes: 1,
        prediction_length: i64::MAX / 2,
        ..fixture_config(TestWindowOffset::Buckets)
    };
    assert!(matches!(
        window_table(&table, &buckets),
        Err(WindowError::Config(ConfigError::Invalid(_)))
    ));
}

#[test]
fn missing_dataset_file_is_a_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = run_windowing(
        &dir.path().join("absent.txt"),
        dir.path(),
        &WindowConfig::default(),
    );
    assert!(matches!(result, Err(WindowError::Read { .. })));
}
