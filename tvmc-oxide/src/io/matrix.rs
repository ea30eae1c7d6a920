use std::fs;
use std::path::{Path, PathBuf};

use faer::Mat;

/// Header sanity bounds for the binary delta-trajectory format.
const MAX_BINARY_COLS: i32 = 1000;
const MAX_BINARY_ROWS: i32 = 1_000_000;

#[remain::sorted]
#[derive(thiserror::Error, Debug)]
pub enum Err {
    #[error("bad value {token:?} in {path:?} line {line}")]
    BadValue {
        path: PathBuf,
        line: usize,
        token: String,
    },
    #[error("{path:?} declares an invalid shape ({rows} x {cols})")]
    HeaderOutOfRange {
        path: PathBuf,
        rows: i32,
        cols: i32,
    },
    #[error("no data found in {path:?}")]
    NoData { path: PathBuf },
    #[error("failed to read {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path:?} line {line} has {got} columns, expected {expected}")]
    RowLengthMismatch {
        path: PathBuf,
        line: usize,
        got: usize,
        expected: usize,
    },
    #[error("{path:?} is truncated: expected {expected} bytes of payload, found {got}")]
    Truncated {
        path: PathBuf,
        expected: usize,
        got: usize,
    },
}

/// Loads a whitespace-delimited text matrix, one row per non-empty line,
/// `\r` tolerant. Every row must have the same column count; empty input
/// is rejected.
pub fn load_txt<P: AsRef<Path>>(path: P) -> Result<Mat<f64>, Err> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| Err::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        let mut row = Vec::new();
        for token in line.split_whitespace() {
            let value = token.parse::<f64>().map_err(|_| Err::BadValue {
                path: path.to_path_buf(),
                line: line_no + 1,
                token: token.to_owned(),
            })?;
            row.push(value);
        }
        if row.is_empty() {
            continue;
        }
        if let Some(first) = rows.first() {
            if row.len() != first.len() {
                return Result::Err(Err::RowLengthMismatch {
                    path: path.to_path_buf(),
                    line: line_no + 1,
                    got: row.len(),
                    expected: first.len(),
                });
            }
        }
        rows.push(row);
    }

    if rows.is_empty() {
        return Result::Err(Err::NoData {
            path: path.to_path_buf(),
        });
    }

    Ok(Mat::from_fn(rows.len(), rows[0].len(), |i, j| rows[i][j]))
}

/// Loads the binary delta-trajectory matrix: two little-endian i32s
/// (`rows`, `cols`) followed by `rows * cols` little-endian f64s in
/// row-major order. Shapes outside the sanity bounds are rejected before
/// any payload is touched.
pub fn load_delta_trajectories<P: AsRef<Path>>(path: P) -> Result<Mat<f64>, Err> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| Err::ReadError {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.len() < 8 {
        return Result::Err(Err::Truncated {
            path: path.to_path_buf(),
            expected: 8,
            got: bytes.len(),
        });
    }

    let rows = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let cols = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    tracing::debug!(rows, cols, "delta trajectory header");

    if rows <= 0 || cols <= 0 || cols > MAX_BINARY_COLS || rows > MAX_BINARY_ROWS {
        return Result::Err(Err::HeaderOutOfRange {
            path: path.to_path_buf(),
            rows,
            cols,
        });
    }

    let (rows, cols) = (rows as usize, cols as usize);
    let expected = rows * cols * 8;
    let payload = &bytes[8..];
    if payload.len() < expected {
        return Result::Err(Err::Truncated {
            path: path.to_path_buf(),
            expected,
            got: payload.len(),
        });
    }

    let values: Vec<f64> = payload[..expected]
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();

    Ok(Mat::from_fn(rows, cols, |i, j| values[i * cols + j]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    fn binary_payload(rows: i32, cols: i32, values: &[f64]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&cols.to_le_bytes());
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn text_matrix_parses_rows_and_columns() {
        let file = write_temp(b"1.0 2.0 3.0\r\n4 5e-1 -6\n\n");
        let m = load_txt(file.path()).unwrap();
        assert_eq!((m.nrows(), m.ncols()), (2, 3));
        assert_eq!(m[(0, 1)], 2.0);
        assert_eq!(m[(1, 1)], 0.5);
        assert_eq!(m[(1, 2)], -6.0);
    }

    #[test]
    fn text_matrix_rejects_ragged_rows() {
        let file = write_temp(b"1 2 3\n4 5\n");
        assert!(matches!(
            load_txt(file.path()),
            Result::Err(Err::RowLengthMismatch { got: 2, expected: 3, .. })
        ));
    }

    #[test]
    fn text_matrix_rejects_empty_input() {
        let file = write_temp(b"\n\n");
        assert!(matches!(
            load_txt(file.path()),
            Result::Err(Err::NoData { .. })
        ));
    }

    #[test]
    fn text_matrix_rejects_garbage() {
        let file = write_temp(b"1 banana 3\n");
        assert!(matches!(
            load_txt(file.path()),
            Result::Err(Err::BadValue { .. })
        ));
    }

    #[test]
    fn binary_matrix_round_trips() {
        let values = [1.0, -2.5, 3.25, 0.0, 1e-8, 7.0];
        let file = write_temp(&binary_payload(2, 3, &values));
        let m = load_delta_trajectories(file.path()).unwrap();
        assert_eq!((m.nrows(), m.ncols()), (2, 3));
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 1)], -2.5);
        assert_eq!(m[(1, 2)], 7.0);
    }

    #[test]
    fn binary_matrix_rejects_oversized_header() {
        let file = write_temp(&binary_payload(4, 5000, &[]));
        assert!(matches!(
            load_delta_trajectories(file.path()),
            Result::Err(Err::HeaderOutOfRange { cols: 5000, .. })
        ));
    }

    #[test]
    fn binary_matrix_rejects_negative_rows() {
        let file = write_temp(&binary_payload(-1, 4, &[]));
        assert!(matches!(
            load_delta_trajectories(file.path()),
            Result::Err(Err::HeaderOutOfRange { rows: -1, .. })
        ));
    }

    #[test]
    fn binary_matrix_rejects_truncated_payload() {
        let file = write_temp(&binary_payload(2, 2, &[1.0, 2.0, 3.0]));
        assert!(matches!(
            load_delta_trajectories(file.path()),
            Result::Err(Err::Truncated { .. })
        ));
    }
}
