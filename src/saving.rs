use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::ExportError;
use crate::store::{Snapshot, Store};

/// Gzip-compressed JSON of a snapshot, for moving a sheet between machines.
pub fn encode_snapshot(snapshot: &Snapshot) -> Result<Vec<u8>, ExportError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut encoder, snapshot)?;
    Ok(encoder.finish()?)
}

pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, ExportError> {
    let mut json = Vec::new();
    GzDecoder::new(bytes).read_to_end(&mut json)?;
    Ok(serde_json::from_slice(&json)?)
}

pub fn save_sheet(store: &Store, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&encode_snapshot(&store.snapshot())?)?;
    writer.flush()?;
    Ok(())
}

/// Replaces the store contents with the sheet saved at `path`.
pub fn load_sheet(store: &Store, path: impl AsRef<Path>) -> Result<(), ExportError> {
    let mut bytes = Vec::new();
    BufReader::new(File::open(path)?).read_to_end(&mut bytes)?;
    let snapshot = decode_snapshot(&bytes)?;
    store.replace_all(snapshot)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Field, Record};

    #[test]
    fn saved_sheet_loads_into_another_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.json.gz");

        let source = Store::in_memory();
        source.set_title("people").unwrap();
        source
            .append(Record::default().with_text(Field::Id, "1").with_text(Field::Version, "abc"))
            .unwrap();
        save_sheet(&source, &path).unwrap();

        let target = Store::in_memory();
        target.append(Record::default().with_text(Field::Id, "old")).unwrap();
        load_sheet(&target, &path).unwrap();
        assert_eq!(target.snapshot(), source.snapshot());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(decode_snapshot(b"plain text"), Err(ExportError::Io(_))));
    }
}
