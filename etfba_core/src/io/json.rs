//! Module providing JSON IO for reaction rows
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::configuration::Configuration;
use crate::io::rows::{ReactionRow, RowError};
use crate::metabolic_model::model::NetworkModel;

/// Read a JSON file holding an array of reaction rows
pub fn read_rows_json<P: AsRef<Path>>(path: P) -> Result<Vec<ReactionRow>, JsonError> {
    let rows_str = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) => return Err(JsonError::UnableToRead(format!("{err}"))),
    };
    match serde_json::from_str::<Vec<ReactionRow>>(&rows_str) {
        Ok(rows) => Ok(rows),
        Err(err) => Err(JsonError::UnableToParse(format!("{err}"))),
    }
}

/// Write reaction rows as a pretty printed JSON array
pub fn write_rows_json<P: AsRef<Path>>(path: P, rows: &[ReactionRow]) -> Result<(), JsonError> {
    let rows_string = serde_json::to_string_pretty(rows)?;
    fs::write(path, rows_string)?;
    Ok(())
}

impl NetworkModel {
    /// Read a network from a JSON file of reaction rows
    pub fn read_json<P: AsRef<Path>>(path: P, config: &Configuration) -> Result<NetworkModel, JsonError> {
        let rows = read_rows_json(path)?;
        Ok(NetworkModel::from_rows(rows, config)?)
    }

    /// Write the network as a JSON file of reaction rows
    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), JsonError> {
        write_rows_json(path, &self.to_rows())
    }
}

#[derive(Error, Debug)]
pub enum JsonError {
    #[error("unable to read file due to {0}")]
    UnableToRead(String),
    #[error("unable to parse json due to {0}")]
    UnableToParse(String),
    #[error(transparent)]
    InvalidRow(#[from] RowError),
    #[error("serde json error")]
    SerdeJsonParseError(#[from] serde_json::Error),
    #[error("unable to write to file")]
    UnableToWrite(#[from] std::io::Error),
}
