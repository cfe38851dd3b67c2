//! Frame-keyed prediction tables
//!
//! One table per behavior comes out of inference; the tables of one video
//! are merged with an outer join on the frame index and written as CSV.

use crate::error::{Result, TaggerError};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

/// Name of the frame index column
pub const FRAME_COLUMN: &str = "Frame";

/// One labelled column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<i64>,
}

/// Table of per-frame labels keyed by frame index
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct PredictionTable {
    frames: Vec<i64>,
    columns: Vec<Column>,
}

impl PredictionTable {
    pub fn new(frames: Vec<i64>) -> Self {
        Self {
            frames,
            columns: Vec::new(),
        }
    }

    /// Table whose frames are the positions `0..len`
    pub fn sequential(len: usize) -> Self {
        Self::new((0..len as i64).collect())
    }

    /// Add a column; its length must match the frame column
    pub fn with_column(mut self, name: &str, values: Vec<i64>) -> Result<Self> {
        self.push_column(name, values)?;
        Ok(self)
    }

    pub fn push_column(&mut self, name: &str, values: Vec<i64>) -> Result<()> {
        if name == FRAME_COLUMN || self.column(name).is_some() {
            return Err(TaggerError::InvalidTable(format!("duplicate column {name}")));
        }
        if values.len() != self.frames.len() {
            return Err(TaggerError::InvalidTable(format!(
                "column {name} has {} rows, table has {}",
                values.len(),
                self.frames.len()
            )));
        }
        self.columns.push(Column {
            name: name.to_string(),
            values,
        });
        Ok(())
    }

    pub fn frames(&self) -> &[i64] {
        &self.frames
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&[i64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Reorder rows by ascending frame index (stable)
    pub fn sort_by_frame(&mut self) {
        let mut order: Vec<usize> = (0..self.frames.len()).collect();
        order.sort_by_key(|&i| self.frames[i]);
        self.frames = order.iter().map(|&i| self.frames[i]).collect();
        for column in &mut self.columns {
            column.values = order.iter().map(|&i| column.values[i]).collect();
        }
    }

    fn frame_rows(&self) -> Result<HashMap<i64, usize>> {
        let mut rows = HashMap::with_capacity(self.frames.len());
        for (row, frame) in self.frames.iter().enumerate() {
            if rows.insert(*frame, row).is_some() {
                return Err(TaggerError::InvalidTable(format!(
                    "frame {frame} appears more than once in columns {:?}",
                    self.column_names()
                )));
            }
        }
        Ok(rows)
    }

    /// Merge tables on the frame index.
    ///
    /// The result holds the union of all frames in first-seen order, the
    /// columns of every table in argument order, and 0 wherever a table has
    /// no row for a frame. Call [`sort_by_frame`](Self::sort_by_frame) for
    /// ascending frames.
    pub fn outer_join(tables: &[PredictionTable]) -> Result<PredictionTable> {
        let mut seen = HashSet::new();
        let frames: Vec<i64> = tables
            .iter()
            .flat_map(|t| t.frames.iter().copied())
            .filter(|frame| seen.insert(*frame))
            .collect();

        let mut merged = PredictionTable::new(frames);
        for table in tables {
            let rows = table.frame_rows()?;
            for column in &table.columns {
                let values = merged
                    .frames
                    .iter()
                    .map(|frame| rows.get(frame).map(|&row| column.values[row]).unwrap_or(0))
                    .collect();
                merged.push_column(&column.name, values)?;
            }
        }
        Ok(merged)
    }

    /// Write as CSV with a `Frame` column first
    pub fn write_csv<W: Write>(&self, writer: W, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(writer);

        let mut header = vec![FRAME_COLUMN.to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        writer.write_record(&header)?;

        for (row, frame) in self.frames.iter().enumerate() {
            let mut record = vec![frame.to_string()];
            record.extend(self.columns.iter().map(|c| c.values[row].to_string()));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_csv(file, b',')
    }

    /// Read a table whose first column is the frame index
    pub fn read_csv<R: Read>(reader: R, delimiter: u8) -> Result<PredictionTable> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        if headers.get(0) != Some(FRAME_COLUMN) {
            return Err(TaggerError::InvalidTable(format!(
                "first column must be {FRAME_COLUMN}, found {:?}",
                headers.get(0)
            )));
        }

        let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();
        let mut frames = Vec::new();
        let mut values: Vec<Vec<i64>> = vec![Vec::new(); names.len()];

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut cells = record.iter();
            let frame = cells.next().unwrap_or_default();
            frames.push(parse_label(frame, line)?);
            for (column, cell) in values.iter_mut().zip(cells) {
                column.push(parse_label(cell, line)?);
            }
        }

        let mut table = PredictionTable::new(frames);
        for (name, column) in names.iter().zip(values) {
            table.push_column(name, column)?;
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<PredictionTable> {
        let file = std::fs::File::open(path)?;
        Self::read_csv(file, b',')
    }
}

/// Integer cell; integral floats such as `1.0` are accepted
fn parse_label(cell: &str, line: usize) -> Result<i64> {
    let cell = cell.trim();
    if let Ok(value) = cell.parse::<i64>() {
        return Ok(value);
    }
    match cell.parse::<f64>() {
        Ok(value) if value.fract() == 0.0 => Ok(value as i64),
        _ => Err(TaggerError::InvalidTable(format!(
            "row {}: expected an integer label, found {cell:?}",
            line + 1
        ))),
    }
}
