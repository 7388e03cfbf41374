//! On-disk record layout
//!
//! One file per key. All integers are little-endian:
//!
//! ```text
//! u32  magic (CACHE_MAGIC)
//! str  key
//! str  etag ("" when absent)
//! i64  server_date
//! i64  last_modified
//! i64  ttl
//! i64  soft_ttl
//! i32  header count, then that many (str name, str value) pairs
//! ...  payload bytes up to end of file
//! ```
//!
//! `str` is an i64 byte length followed by UTF-8 bytes. The payload length is
//! not stored; it is whatever follows the header.

use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::errors::CacheError;
use super::record::CacheRecord;
use crate::http::Headers;

/// Magic number for the current version of the cache file format
pub const CACHE_MAGIC: u32 = 0x2015_0306;

/// Decoded record header, everything but the payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub key: String,
    pub etag: Option<String>,
    pub server_date: i64,
    pub last_modified: i64,
    pub ttl: i64,
    pub soft_ttl: i64,
    pub response_headers: Headers,
}

impl RecordHeader {
    pub(crate) fn into_record(self, data: Vec<u8>) -> CacheRecord {
        CacheRecord {
            key: self.key,
            data,
            etag: self.etag,
            server_date: self.server_date,
            last_modified: self.last_modified,
            ttl: self.ttl,
            soft_ttl: self.soft_ttl,
            response_headers: self.response_headers,
        }
    }
}

/// Reader that counts how many bytes have been consumed
pub(crate) struct CountingReader<R> {
    inner: R,
    count: u64,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self { inner, count: 0 }
    }

    pub(crate) fn bytes_read(&self) -> u64 {
        self.count
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

fn write_string<W: Write>(w: &mut W, value: &str) -> io::Result<()> {
    w.write_i64::<LittleEndian>(value.len() as i64)?;
    w.write_all(value.as_bytes())
}

/// Write the header for `record`, payload excluded
pub(crate) fn write_header<W: Write>(w: &mut W, record: &CacheRecord) -> io::Result<()> {
    w.write_u32::<LittleEndian>(CACHE_MAGIC)?;
    write_string(w, &record.key)?;
    write_string(w, record.etag.as_deref().unwrap_or(""))?;
    w.write_i64::<LittleEndian>(record.server_date)?;
    w.write_i64::<LittleEndian>(record.last_modified)?;
    w.write_i64::<LittleEndian>(record.ttl)?;
    w.write_i64::<LittleEndian>(record.soft_ttl)?;

    w.write_i32::<LittleEndian>(record.response_headers.len() as i32)?;
    for (name, value) in &record.response_headers {
        write_string(w, name)?;
        write_string(w, value)?;
    }
    Ok(())
}

/// Read a length-prefixed string, refusing lengths beyond `limit`
fn read_string<R: Read>(r: &mut R, limit: u64) -> Result<String, CacheError> {
    let len = r.read_i64::<LittleEndian>()?;
    if len < 0 || len as u64 > limit {
        return Err(CacheError::Corrupt(format!("string length {} out of range", len)));
    }

    let mut bytes = vec![0u8; len as usize];
    r.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| CacheError::Corrupt(e.to_string()))
}

/// Read a record header
///
/// `limit` bounds every length prefix, normally the file length.
pub(crate) fn read_header<R: Read>(r: &mut R, limit: u64) -> Result<RecordHeader, CacheError> {
    let magic = r.read_u32::<LittleEndian>()?;
    if magic != CACHE_MAGIC {
        return Err(CacheError::BadMagic(magic));
    }

    let key = read_string(r, limit)?;
    let etag = Some(read_string(r, limit)?).filter(|etag| !etag.is_empty());
    let server_date = r.read_i64::<LittleEndian>()?;
    let last_modified = r.read_i64::<LittleEndian>()?;
    let ttl = r.read_i64::<LittleEndian>()?;
    let soft_ttl = r.read_i64::<LittleEndian>()?;

    let count = r.read_i32::<LittleEndian>()?;
    if count < 0 || count as u64 > limit {
        return Err(CacheError::Corrupt(format!("header count {} out of range", count)));
    }
    let mut response_headers = Headers::with_capacity(count as usize);
    for _ in 0..count {
        let name = read_string(r, limit)?;
        let value = read_string(r, limit)?;
        response_headers.insert(name, value);
    }

    Ok(RecordHeader {
        key,
        etag,
        server_date,
        last_modified,
        ttl,
        soft_ttl,
        response_headers,
    })
}

/// Read only the header of a record file and the size of its payload
pub(crate) fn read_header_file(path: &Path) -> Result<(RecordHeader, u64), CacheError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = CountingReader::new(BufReader::new(file));

    let header = read_header(&mut reader, file_len)?;
    let payload_len = payload_len(file_len, reader.bytes_read())?;
    Ok((header, payload_len))
}

/// Read a whole record file
pub(crate) fn read_record_file(path: &Path) -> Result<CacheRecord, CacheError> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = CountingReader::new(BufReader::new(file));

    let header = read_header(&mut reader, file_len)?;
    let remaining = payload_len(file_len, reader.bytes_read())?;

    let capacity = usize::try_from(remaining).map_err(|_| CacheError::OutOfResource(remaining))?;
    let mut data = Vec::new();
    data.try_reserve_exact(capacity)
        .map_err(|_| CacheError::OutOfResource(remaining))?;
    reader.by_ref().take(remaining).read_to_end(&mut data)?;
    if data.len() as u64 != remaining {
        return Err(CacheError::Corrupt(format!(
            "payload truncated: expected {} bytes, got {}",
            remaining,
            data.len()
        )));
    }

    Ok(header.into_record(data))
}

fn payload_len(file_len: u64, header_len: u64) -> Result<u64, CacheError> {
    file_len
        .checked_sub(header_len)
        .ok_or_else(|| CacheError::Corrupt("header longer than file".to_string()))
}
