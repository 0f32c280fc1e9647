use pretty_assertions::assert_eq;
use sensorlink_core::batch::{
    read_samples, run_batch, sensor_column, write_results, BatchError, BatchOptions, SampleRecord,
};
use sensorlink_core::demo::SimulatedDevice;
use sensorlink_core::protocol::{PollPolicy, Session, SessionConfig};
use std::io::Write;
use std::time::{Duration, Instant};

fn header() -> String {
    let mut cols = vec!["sample_id".to_string()];
    cols.extend((0..16).map(sensor_column));
    cols.push("true_x".to_string());
    cols.push("true_y".to_string());
    cols.join(",")
}

fn row(id: &str, sensor: &str, true_x: f64, true_y: f64) -> String {
    let mut cells = vec![id.to_string()];
    cells.extend(std::iter::repeat(sensor.to_string()).take(16));
    cells.push(true_x.to_string());
    cells.push(true_y.to_string());
    cells.join(",")
}

fn write_csv(lines: &[String]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();
    file
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

fn demo_session(device: SimulatedDevice) -> Session {
    init_logging();
    let config = SessionConfig {
        address: "demo".to_string(),
        read_timeout: Duration::from_millis(50),
        settle_delay: Duration::ZERO,
        banner_wait: Duration::ZERO,
        ..SessionConfig::default()
    };
    Session::attach(Box::new(device), &config).unwrap()
}

fn fast_options(deadline_ms: u64) -> BatchOptions {
    BatchOptions {
        policy: PollPolicy {
            post_send_pause: Duration::from_millis(5),
            poll_interval: Duration::from_millis(5),
            response_deadline: Duration::from_millis(deadline_ms),
        },
        inter_sample_delay: Duration::ZERO,
    }
}

#[test]
fn test_read_samples() {
    let file = write_csv(&[header(), row("a", "1.5", 0.25, 0.75), String::new(), row("b", "2", 0.5, 0.5)]);
    let samples = read_samples(file.path()).unwrap();

    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].sample_id, "a");
    assert_eq!(samples[0].sensors, [1.5; 16]);
    assert_eq!(samples[0].true_x, 0.25);
    assert_eq!(samples[1].sample_id, "b");
    assert_eq!(samples[1].true_y, 0.5);
}

#[test]
fn test_read_samples_without_id_column() {
    let mut cols: Vec<String> = (0..16).map(sensor_column).collect();
    cols.push("true_y".to_string());
    cols.push("true_x".to_string());
    let mut cells = vec!["0".to_string(); 16];
    cells.push("9".to_string());
    cells.push("8".to_string());

    let file = write_csv(&[cols.join(","), cells.join(","), cells.join(",")]);
    let samples = read_samples(file.path()).unwrap();
    assert_eq!(samples[0].sample_id, "0");
    assert_eq!(samples[1].sample_id, "1");
    assert_eq!(samples[0].true_x, 8.0);
    assert_eq!(samples[0].true_y, 9.0);
}

#[test]
fn test_read_samples_missing_columns() {
    let header = header()
        .replace(",sensor_03", "")
        .replace(",true_y", "");
    let file = write_csv(&[header]);

    match read_samples(file.path()) {
        Err(BatchError::MissingColumns(missing)) => {
            assert_eq!(missing, vec!["sensor_03".to_string(), "true_y".to_string()])
        }
        other => panic!("expected MissingColumns, got {:?}", other),
    }
}

#[test]
fn test_read_samples_bad_cell() {
    let file = write_csv(&[header(), row("a", "high", 0.0, 0.0)]);
    assert!(matches!(
        read_samples(file.path()),
        Err(BatchError::InvalidCell { row: 0, .. })
    ));
}

#[test]
fn test_short_row_is_padded() {
    // the row stops after sensor_13
    let mut cells = vec!["short".to_string()];
    cells.extend(std::iter::repeat("0.5".to_string()).take(14));
    let file = write_csv(&[header(), cells.join(","), row("full", "0.5", 0.5, 0.5)]);

    let samples = read_samples(file.path()).unwrap();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].sample_id, "short");
    assert_eq!(samples[0].sensors[13], 0.5);
    assert!(samples[0].sensors[14].is_nan());
    assert!(samples[0].sensors[15].is_nan());
    assert!(samples[0].true_x.is_nan());

    let mut session = demo_session(SimulatedDevice::with_seed(11));
    let results = run_batch(&mut session, &samples, &fast_options(500), |_| {});
    assert!(!results[0].success);
    assert!(results[1].success);
}

#[test]
fn test_long_row_is_rejected() {
    let long = format!("{},extra", row("a", "1", 0.0, 0.0));
    let file = write_csv(&[header(), long]);
    assert!(matches!(
        read_samples(file.path()),
        Err(BatchError::RowLength {
            row: 0,
            expected: 19,
            actual: 20
        })
    ));
}

#[test]
fn test_read_samples_missing_file() {
    let err = read_samples("/nonexistent/samples.csv").unwrap_err();
    assert!(matches!(err, BatchError::Io { .. }));
}

#[test]
fn test_batch_against_simulated_device() {
    let samples = vec![
        SampleRecord {
            sample_id: "corner".to_string(),
            sensors: {
                let mut s = [0.0; 16];
                s[0] = 1.0;
                s
            },
            true_x: 0.0,
            true_y: 0.0,
        },
        SampleRecord {
            sample_id: "flat".to_string(),
            sensors: [1.0; 16],
            true_x: 0.4,
            true_y: 0.6,
        },
    ];

    let mut session = demo_session(SimulatedDevice::with_seed(3));
    let mut seen = Vec::new();
    let results = run_batch(&mut session, &samples, &fast_options(1000), |r| {
        seen.push(r.sample_id.clone())
    });

    assert_eq!(seen, vec!["corner", "flat"]);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(results[0].predicted_x, Some(0.0));
    assert_eq!(results[0].predicted_y, Some(0.0));
    assert_eq!(results[1].predicted_x, Some(0.5));

    let (ex, ey) = results[1].abs_error().unwrap();
    assert!((ex - 0.1).abs() < 1e-9);
    assert!((ey - 0.1).abs() < 1e-9);

    let us = results[0].inference_time_us.unwrap();
    assert!((14_000..16_000).contains(&us));
    assert_eq!(results[0].inference_time_ms, Some(us as f64 / 1000.0));
}

#[test]
fn test_batch_continues_after_bad_sample() {
    let mut bad = [0.5; 16];
    bad[7] = f64::NAN;
    let samples = vec![
        SampleRecord {
            sample_id: "missing-reading".to_string(),
            sensors: bad,
            true_x: 0.0,
            true_y: 0.0,
        },
        SampleRecord {
            sample_id: "ok".to_string(),
            sensors: [0.5; 16],
            true_x: 0.5,
            true_y: 0.5,
        },
    ];

    let mut session = demo_session(SimulatedDevice::with_seed(5));
    let results = run_batch(&mut session, &samples, &fast_options(500), |_| {});

    assert_eq!(results.len(), 2);
    assert!(!results[0].success);
    assert_eq!(results[0].predicted_x, None);
    assert!(results[1].success);
}

#[test]
fn test_batch_after_close_records_failures() {
    let samples = vec![SampleRecord {
        sample_id: "late".to_string(),
        sensors: [0.5; 16],
        true_x: 0.5,
        true_y: 0.5,
    }];

    let mut session = demo_session(SimulatedDevice::with_seed(5));
    session.close();
    let results = run_batch(&mut session, &samples, &fast_options(500), |_| {});
    assert_eq!(results.len(), 1);
    assert!(!results[0].success);
}

#[test]
fn test_missing_timing_is_still_success() {
    let samples = vec![SampleRecord {
        sample_id: "no-timing".to_string(),
        sensors: [0.5; 16],
        true_x: 0.5,
        true_y: 0.5,
    }];

    let mut session = demo_session(SimulatedDevice::with_seed(5).without_timing());
    let start = Instant::now();
    let results = run_batch(&mut session, &samples, &fast_options(150), |_| {});

    assert!(results[0].success);
    assert_eq!(results[0].inference_time_us, None);
    assert_eq!(results[0].inference_time_ms, None);
    // without the timing line the loop has to run to the deadline
    assert!(start.elapsed() >= Duration::from_millis(150));
}

#[test]
fn test_millisecond_firmware() {
    let samples = vec![SampleRecord {
        sample_id: "ms".to_string(),
        sensors: [0.5; 16],
        true_x: 0.5,
        true_y: 0.5,
    }];

    let mut session = demo_session(SimulatedDevice::with_seed(5).millis_only());
    let results = run_batch(&mut session, &samples, &fast_options(500), |_| {});
    let us = results[0].inference_time_us.unwrap();
    assert_eq!(us % 10, 0, "ms with two decimals is a multiple of 10us");
}

#[test]
fn test_write_results_round_trip_columns() {
    let samples = vec![SampleRecord {
        sample_id: "id,with,commas".to_string(),
        sensors: [0.5; 16],
        true_x: 0.5,
        true_y: 0.5,
    }];
    let mut session = demo_session(SimulatedDevice::with_seed(9).without_timing());
    let mut results = run_batch(&mut session, &samples, &fast_options(50), |_| {});
    results.push(sensorlink_core::batch::SampleResult::failed(&samples[0]));

    let out = tempfile::NamedTempFile::new().unwrap();
    write_results(out.path(), &results).unwrap();

    let text = std::fs::read_to_string(out.path()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with(
        "sample_id,true_x,true_y,predicted_x,predicted_y,inference_time_us,inference_time_ms,success,sensor_00,"
    ));
    assert!(lines[0].ends_with(",sensor_15"));
    assert!(lines[1].starts_with("\"id,with,commas\",0.5,0.5,0.5,0.5,,,true,0.5"));
    assert!(lines[2].starts_with("\"id,with,commas\",0.5,0.5,,,,,false,0.5"));
}
