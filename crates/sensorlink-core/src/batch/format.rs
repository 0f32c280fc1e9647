//! Sample and result files
//!
//! Plain CSV with a header row. Quoted cells are understood on input;
//! output never needs quoting except for sample ids.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::{BatchError, SampleRecord, SampleResult};
use crate::protocol::SENSOR_COUNT;

/// Column names of the results file, sensor columns excluded
pub const RESULT_COLUMNS: [&str; 8] = [
    "sample_id",
    "true_x",
    "true_y",
    "predicted_x",
    "predicted_y",
    "inference_time_us",
    "inference_time_ms",
    "success",
];

/// Name of sensor column `i`, e.g. `sensor_07`
pub fn sensor_column(i: usize) -> String {
    format!("sensor_{:02}", i)
}

/// Split one CSV line, honoring double-quoted cells
fn split_line(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);
    cells
}

fn quote(cell: &str) -> String {
    if cell.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

fn parse_number(row: usize, column: &str, value: &str) -> Result<f64, BatchError> {
    let value = value.trim();
    // An empty cell is a missing reading, not a malformed one
    if value.is_empty() {
        return Ok(f64::NAN);
    }
    value.parse().map_err(|_| BatchError::InvalidCell {
        row,
        column: column.to_string(),
        value: value.to_string(),
    })
}

/// Read samples from a CSV file
///
/// Requires `sensor_00`..`sensor_15`, `true_x` and `true_y`; `sample_id` is
/// optional. Column order does not matter and extra columns are ignored.
/// Blank lines are skipped; short rows are padded with empty cells.
pub fn read_samples<P: AsRef<Path>>(path: P) -> Result<Vec<SampleRecord>, BatchError> {
    let path = path.as_ref();
    let io_err = |source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let mut lines = BufReader::new(file).lines();

    let header = match lines.next() {
        Some(line) => line.map_err(io_err)?,
        None => return Err(BatchError::MissingHeader(path.to_path_buf())),
    };
    let header: Vec<String> = split_line(header.trim_start_matches('\u{feff}'))
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();
    let index: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let sensor_names: Vec<String> = (0..SENSOR_COUNT).map(sensor_column).collect();
    let missing: Vec<String> = sensor_names
        .iter()
        .map(String::as_str)
        .chain(["true_x", "true_y"])
        .filter(|name| !index.contains_key(name))
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(BatchError::MissingColumns(missing));
    }

    let mut samples = Vec::new();
    for (row, line) in lines.enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }
        let mut cells = split_line(&line);
        if cells.len() > header.len() {
            return Err(BatchError::RowLength {
                row,
                expected: header.len(),
                actual: cells.len(),
            });
        }
        // Missing trailing cells are missing readings
        cells.resize(header.len(), String::new());

        let mut sensors = [0.0; SENSOR_COUNT];
        for (i, name) in sensor_names.iter().enumerate() {
            sensors[i] = parse_number(row, name, &cells[index[name.as_str()]])?;
        }
        let true_x = parse_number(row, "true_x", &cells[index["true_x"]])?;
        let true_y = parse_number(row, "true_y", &cells[index["true_y"]])?;
        let sample_id = index
            .get("sample_id")
            .map(|&i| cells[i].trim().to_string())
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| samples.len().to_string());

        samples.push(SampleRecord {
            sample_id,
            sensors,
            true_x,
            true_y,
        });
    }

    Ok(samples)
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write results to a CSV file, absent values as empty cells
pub fn write_results<P: AsRef<Path>>(path: P, results: &[SampleResult]) -> Result<(), BatchError> {
    let path = path.as_ref();
    let io_err = |source| BatchError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    let mut header: Vec<String> = RESULT_COLUMNS.iter().map(|c| c.to_string()).collect();
    header.extend((0..SENSOR_COUNT).map(sensor_column));
    writeln!(writer, "{}", header.join(",")).map_err(io_err)?;

    for result in results {
        let mut row = vec![
            quote(&result.sample_id),
            result.true_x.to_string(),
            result.true_y.to_string(),
            opt(result.predicted_x),
            opt(result.predicted_y),
            opt(result.inference_time_us),
            opt(result.inference_time_ms),
            result.success.to_string(),
        ];
        row.extend(result.sensors.iter().map(|v| v.to_string()));
        writeln!(writer, "{}", row.join(",")).map_err(io_err)?;
    }

    writer.flush().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_column_names() {
        assert_eq!(sensor_column(0), "sensor_00");
        assert_eq!(sensor_column(15), "sensor_15");
    }

    #[test]
    fn test_split_line_quotes() {
        assert_eq!(split_line("a,b,,c"), vec!["a", "b", "", "c"]);
        assert_eq!(
            split_line(r#""id, 1",2,"say ""hi""""#),
            vec!["id, 1", "2", r#"say "hi""#]
        );
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("plain"), "plain");
        assert_eq!(quote("a,b"), "\"a,b\"");
        assert_eq!(quote("5\""), "\"5\"\"\"");
    }

    #[test]
    fn test_parse_number_empty_is_nan() {
        assert!(parse_number(0, "sensor_00", " ").unwrap().is_nan());
        assert!(matches!(
            parse_number(3, "true_x", "abc"),
            Err(BatchError::InvalidCell { row: 3, .. })
        ));
    }
}
