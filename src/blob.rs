//! Binary resource container.
//!
//! A container maps string IDs to byte payloads. It is produced once by the
//! packer and read wholesale at startup. Layout (little-endian):
//!
//! ```text
//! "BLOB"                      magic
//! u32                         entry count
//! entry * count:
//!     u16                     id length
//!     [u8; id length]         id (UTF-8)
//!     u64                     payload offset, relative to the payload region
//!     u64                     payload length
//! payload region              payloads concatenated in directory order
//! ```

use std::collections::HashMap;
use std::io::{Read, Write};
use std::ops::Range;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};

pub const MAGIC: &[u8; 4] = b"BLOB";

/// Collects records in insertion order and serializes them.
#[derive(Debug, Default, Clone)]
pub struct BlobWriter {
    records: Vec<(String, Vec<u8>)>,
    ids: HashMap<String, usize>,
}

impl BlobWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Result<()> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::InvalidId("empty ID".to_string()));
        }
        if id.len() > u16::MAX as usize {
            return Err(Error::InvalidId(format!(
                "ID of {} bytes exceeds the {} byte limit",
                id.len(),
                u16::MAX
            )));
        }
        if self.ids.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }

        self.ids.insert(id.clone(), self.records.len());
        self.records.push((id, payload.into()));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let directory_len: usize = self
            .records
            .iter()
            .map(|(id, _)| 2 + id.len() + 8 + 8)
            .sum();
        let payload_len: usize = self.records.iter().map(|(_, data)| data.len()).sum();

        let mut out = Vec::with_capacity(MAGIC.len() + 4 + directory_len + payload_len);
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&(self.records.len() as u32).to_le_bytes());

        let mut offset = 0u64;
        for (id, data) in &self.records {
            out.extend_from_slice(&(id.len() as u16).to_le_bytes());
            out.extend_from_slice(id.as_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            offset += data.len() as u64;
        }

        for (_, data) in &self.records {
            out.extend_from_slice(data);
        }

        out
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()?;
        Ok(())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_bytes();
        std::fs::write(path.as_ref(), &bytes)?;
        info!(
            "Wrote {} resources ({} bytes) to {:?}",
            self.records.len(),
            bytes.len(),
            path.as_ref()
        );
        Ok(())
    }
}

/// Serializes an ordered record sequence into container bytes.
pub fn write<I, S, D>(records: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (S, D)>,
    S: Into<String>,
    D: Into<Vec<u8>>,
{
    let mut writer = BlobWriter::new();
    for (id, data) in records {
        writer.append(id, data)?;
    }
    Ok(writer.to_bytes())
}

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    range: Range<usize>,
}

/// A decoded container. Payloads are borrowed slices of the one buffer that
/// was read at startup.
#[derive(Debug, Clone)]
pub struct Blob {
    data: Vec<u8>,
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
}

impl Blob {
    pub fn read(data: Vec<u8>) -> Result<Self> {
        let mut cursor = Cursor::new(&data);

        if cursor.take(MAGIC.len(), "magic")? != MAGIC {
            return Err(Error::Format("bad magic, not a resource container".into()));
        }
        let count = cursor.u32("entry count")? as usize;

        let mut raw_entries = Vec::with_capacity(count.min(data.len() / 20));
        for i in 0..count {
            let id_len = cursor.u16("id length")? as usize;
            if id_len == 0 {
                return Err(Error::Format(format!("entry {} has an empty ID", i)));
            }
            let id_bytes = cursor.take(id_len, "id")?;
            let id = std::str::from_utf8(id_bytes)
                .map_err(|_| Error::Format(format!("entry {} has a non UTF-8 ID", i)))?
                .to_string();
            let offset = cursor.u64("payload offset")?;
            let len = cursor.u64("payload length")?;
            raw_entries.push((id, offset, len));
        }

        let payload_start = cursor.position;
        let payload_len = (data.len() - payload_start) as u64;

        let mut entries = Vec::with_capacity(raw_entries.len());
        let mut index = HashMap::with_capacity(raw_entries.len());
        for (id, offset, len) in raw_entries {
            let end = offset
                .checked_add(len)
                .filter(|end| *end <= payload_len)
                .ok_or_else(|| {
                    Error::Format(format!(
                        "payload of '{}' ({} bytes at {}) lies outside the {} byte payload region",
                        id, len, offset, payload_len
                    ))
                })?;
            if index.contains_key(&id) {
                return Err(Error::Format(format!("duplicate ID '{}'", id)));
            }

            let range = payload_start + offset as usize..payload_start + end as usize;
            index.insert(id.clone(), entries.len());
            entries.push(Entry { id, range });
        }

        debug!("Decoded resource container with {} entries", entries.len());

        Ok(Self {
            data,
            entries,
            index,
        })
    }

    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Self::read(data)
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path.as_ref())?;
        let blob = Self::read(data)?;
        info!(
            "Opened resource container {:?} ({} entries)",
            path.as_ref(),
            blob.len()
        );
        Ok(blob)
    }

    /// Looks up a payload by exact ID. Absence is not an error here; callers
    /// decide whether a missing resource is fatal.
    pub fn get_by_id(&self, id: &str) -> Option<&[u8]> {
        self.index
            .get(id)
            .map(|&i| &self.data[self.entries[i].range.clone()])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// IDs in on-disk order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    /// `(id, payload)` pairs in on-disk order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|e| (e.id.as_str(), &self.data[e.range.clone()]))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                Error::Format(format!(
                    "truncated while reading {} at byte {}",
                    what, self.position
                ))
            })?;
        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        let bytes = self.take(2, what)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rect::Rectangle;

    fn sample() -> Vec<u8> {
        write([
            ("a", vec![1u8, 2, 3]),
            ("rect_x", Rectangle::new(10, 20, 30, 40).to_le_bytes().to_vec()),
        ])
        .unwrap()
    }

    #[test]
    fn lookup_by_id() {
        let blob = Blob::read(sample()).unwrap();
        assert_eq!(blob.get_by_id("a"), Some(&[1u8, 2, 3][..]));
        assert_eq!(blob.get_by_id("missing"), None);

        let rect = Rectangle::from_le_bytes("rect_x", blob.get_by_id("rect_x").unwrap()).unwrap();
        assert_eq!(rect, Rectangle::new(10, 20, 30, 40));
    }

    #[test]
    fn insertion_order_is_kept() {
        let bytes = write([("z", vec![0u8]), ("a", vec![]), ("m", vec![9u8; 5])]).unwrap();
        let blob = Blob::read(bytes).unwrap();
        assert_eq!(blob.ids().collect::<Vec<_>>(), ["z", "a", "m"]);
        assert_eq!(blob.get_by_id("a"), Some(&[][..]));
    }

    #[test]
    fn writer_rejects_bad_ids() {
        let mut writer = BlobWriter::new();
        writer.append("x", vec![1u8]).unwrap();
        assert!(matches!(writer.append("x", vec![2u8]), Err(Error::DuplicateId(_))));
        assert!(matches!(writer.append("", vec![2u8]), Err(Error::InvalidId(_))));
        assert_eq!(writer.len(), 1);
    }

    #[test]
    fn every_truncation_is_a_format_error() {
        let bytes = sample();
        // Cutting into the directory or the payload region must fail; only
        // the full buffer is valid.
        for len in 0..bytes.len() {
            let result = Blob::read(bytes[..len].to_vec());
            assert!(
                matches!(result, Err(Error::Format(_))),
                "truncation to {} bytes was accepted",
                len
            );
        }
        assert!(Blob::read(bytes).is_ok());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = sample();
        bytes[0] = b'X';
        assert!(matches!(Blob::read(bytes), Err(Error::Format(_))));
    }

    #[test]
    fn out_of_range_payload_is_rejected() {
        let mut bytes = write([("a", vec![1u8, 2, 3])]).unwrap();
        // magic(4) + count(4) + id_len(2) + id(1) + offset(8) -> length field
        let length_at = 4 + 4 + 2 + 1 + 8;
        bytes[length_at..length_at + 8].copy_from_slice(&100u64.to_le_bytes());
        assert!(matches!(Blob::read(bytes), Err(Error::Format(_))));
    }

    #[test]
    fn duplicate_ids_on_disk_are_rejected() {
        let mut bytes = write([("a", vec![1u8]), ("b", vec![2u8])]).unwrap();
        // second entry's id byte sits after the first full directory entry
        let second_id_at = 4 + 4 + (2 + 1 + 8 + 8) + 2;
        bytes[second_id_at] = b'a';
        assert!(matches!(Blob::read(bytes), Err(Error::Format(_))));
    }
}
