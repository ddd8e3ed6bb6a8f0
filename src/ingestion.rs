use std::path::Path;

use crate::errors::{AppError, AppResult};

/// Row range of the input to process. `start` is the zero-based first
/// data row, `stop` is exclusive, and either side may be left open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSlice {
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl BatchSlice {
    fn contains(&self, index: usize) -> bool {
        if let Some(start) = self.start {
            if index < start {
                return false;
            }
        }
        if let Some(stop) = self.stop {
            if index >= stop {
                return false;
            }
        }
        true
    }
}

/// Reads the `address` column of the input CSV, honoring the slice and
/// dropping rows whose address cell is blank. Slice indexes count raw
/// data rows, so a rerun with the same bounds sees the same window even
/// when blank rows sit inside it.
pub fn read_addresses(path: &Path, slice: BatchSlice) -> AppResult<Vec<String>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?;
    let column = headers
        .iter()
        .position(|name| name.trim() == "address")
        .ok_or_else(|| {
            AppError::Config(format!(
                "input file {} has no 'address' column",
                path.display()
            ))
        })?;

    let mut addresses = Vec::new();
    for (index, record) in reader.records().enumerate() {
        if let Some(stop) = slice.stop {
            if index >= stop {
                break;
            }
        }
        if !slice.contains(index) {
            continue;
        }
        let record = record?;
        let Some(value) = record.get(column) else {
            continue; // ragged row shorter than the header
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        addresses.push(value.to_string());
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;

    fn write_input(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("addresses.csv");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_address_column() {
        let dir = tempdir().unwrap();
        let path = write_input(
            dir.path(),
            "id,address\n1,香港皇后大道中99號\n2,九龍彌敦道594號\n",
        );

        let addresses = read_addresses(&path, BatchSlice::default()).unwrap();
        assert_eq!(addresses, vec!["香港皇后大道中99號", "九龍彌敦道594號"]);
    }

    #[test]
    fn skips_blank_address_cells() {
        let dir = tempdir().unwrap();
        let path = write_input(dir.path(), "address,id\n香港,1\n,2\n   ,3\n九龍,4\n");

        let addresses = read_addresses(&path, BatchSlice::default()).unwrap();
        assert_eq!(addresses, vec!["香港", "九龍"]);
    }

    #[test]
    fn applies_start_and_stop_bounds() {
        let dir = tempdir().unwrap();
        let path = write_input(dir.path(), "address\na1\na2\na3\na4\na5\n");

        let window = read_addresses(
            &path,
            BatchSlice {
                start: Some(1),
                stop: Some(4),
            },
        )
        .unwrap();
        assert_eq!(window, vec!["a2", "a3", "a4"]);

        let tail = read_addresses(
            &path,
            BatchSlice {
                start: Some(3),
                stop: None,
            },
        )
        .unwrap();
        assert_eq!(tail, vec!["a4", "a5"]);

        let clamped = read_addresses(
            &path,
            BatchSlice {
                start: None,
                stop: Some(99),
            },
        )
        .unwrap();
        assert_eq!(clamped.len(), 5);
    }

    #[test]
    fn missing_address_column_is_an_error() {
        let dir = tempdir().unwrap();
        let path = write_input(dir.path(), "name,street\nfoo,bar\n");

        let err = read_addresses(&path, BatchSlice::default()).unwrap_err();
        assert!(err.to_string().contains("address"), "{err}");
    }
}
