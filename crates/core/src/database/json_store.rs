use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::database::face_database::FaceDatabase;
use crate::database::face_record::FaceRecord;
use crate::shared::FaceId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record stream i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("malformed record at line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate face id {0} at line {1}")]
    DuplicateId(FaceId, usize),
}

/// One element of the on-disk record stream.
#[derive(Serialize, Deserialize)]
struct StoredRecord {
    id: FaceId,
    record: FaceRecord,
}

/// Writes the whole database as a sequential record stream, one
/// `{id, record}` element per line, ids ascending.
pub fn serialize<W: Write>(db: &FaceDatabase, mut writer: W) -> Result<(), StoreError> {
    for (id, record) in db.snapshot_records() {
        let element = StoredRecord { id, record };
        serde_json::to_writer(&mut writer, &element)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

/// Streams records one at a time into `db`, rebuilding the map and
/// advancing `next_id` per record. Returns the number of records read.
///
/// A mid-stream failure leaves already-read records in place; callers
/// doing a risky bulk load should `backup()` first and `restore()` on
/// error.
pub fn deserialize<R: BufRead>(db: &FaceDatabase, reader: R) -> Result<usize, StoreError> {
    let mut count = 0;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_no = index + 1;
        let element: StoredRecord = serde_json::from_str(&line).map_err(|source| {
            StoreError::Malformed {
                line: line_no,
                source,
            }
        })?;
        if !db.insert_stored(element.id, element.record) {
            return Err(StoreError::DuplicateId(element.id, line_no));
        }
        count += 1;
    }
    Ok(count)
}
