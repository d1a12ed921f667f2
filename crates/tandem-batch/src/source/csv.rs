//! Delimited text source with a fixed field-name schema

use csv::{ReaderBuilder, StringRecord, Trim};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::Read;
use std::marker::PhantomData;
use std::path::Path;

use super::RecordSource;
use crate::error::{BatchError, Result};

/// Reads header-less delimited rows and maps column `i` to `schema[i]`
pub struct CsvRecordSource<T, R = File> {
    reader: csv::Reader<R>,
    schema: StringRecord,
    row: StringRecord,
    position: u64,
    _item: PhantomData<fn() -> T>,
}

impl<T> CsvRecordSource<T, File> {
    pub fn from_path(path: impl AsRef<Path>, schema: &[&str], delimiter: u8) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(file, schema, delimiter)
    }
}

impl<T, R: Read> CsvRecordSource<T, R> {
    pub fn from_reader(input: R, schema: &[&str], delimiter: u8) -> Result<Self> {
        if schema.is_empty() {
            return Err(BatchError::Config(
                "CSV schema must name at least one field".to_string(),
            ));
        }

        let reader = ReaderBuilder::new()
            .has_headers(false)
            .delimiter(delimiter)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(input);

        Ok(Self {
            reader,
            schema: StringRecord::from(schema.to_vec()),
            row: StringRecord::new(),
            position: 0,
            _item: PhantomData,
        })
    }

    fn parse_error(&self, message: impl Into<String>) -> BatchError {
        BatchError::Parse {
            position: self.position,
            message: message.into(),
        }
    }
}

impl<T, R> RecordSource for CsvRecordSource<T, R>
where
    T: DeserializeOwned + Send,
    R: Read + Send,
{
    type Item = T;

    fn read_next(&mut self) -> Result<Option<T>> {
        let has_row = match self.reader.read_record(&mut self.row) {
            Ok(has_row) => has_row,
            Err(err) => {
                self.position = err
                    .position()
                    .map(|p| p.line())
                    .unwrap_or(self.position + 1);
                return Err(self.parse_error(err.to_string()));
            },
        };
        if !has_row {
            return Ok(None);
        }

        self.position = self
            .row
            .position()
            .map(|p| p.line())
            .unwrap_or(self.position + 1);

        if self.row.len() != self.schema.len() {
            return Err(self.parse_error(format!(
                "expected {} fields ({}), found {}",
                self.schema.len(),
                self.schema.iter().collect::<Vec<_>>().join(", "),
                self.row.len()
            )));
        }

        self.row
            .deserialize(Some(&self.schema))
            .map(Some)
            .map_err(|err| self.parse_error(err.to_string()))
    }

    fn position(&self) -> u64 {
        self.position
    }
}
