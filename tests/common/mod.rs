//! Shared helpers for the integration tests: an in-memory ZIP reader that
//! checks what the archive writer produced, plus stores that count, fail or
//! stall on demand.

#![allow(dead_code)]

use std::collections::HashSet;
use std::io::{self, Cursor, Read};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;
use tokio::sync::Notify;

use prefixzip::bridge::PipeReader;
use prefixzip::store::{ListPage, ObjectReader, ObjectStore};
use prefixzip::zip::*;

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// One entry as found in the central directory, with its content.
#[derive(Debug, Clone)]
pub struct ReadEntry {
    pub name: String,
    pub flags: u16,
    pub method: CompressionMethod,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub lfh_offset: u64,
    pub external_attrs: u32,
    pub dos_time: u16,
    pub dos_date: u16,
    /// Unix mtime from the 0x5455 extra field
    pub mtime: Option<u32>,
    pub data: Vec<u8>,
}

impl ReadEntry {
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
    }
}

/// Location of the central directory, taken from the end records.
struct Trailer {
    cd_offset: u64,
    cd_size: u64,
    total_entries: u64,
}

/// Read the EOCD at the very end of `archive`, following the ZIP64 locator
/// when any field is saturated.
fn read_trailer(archive: &[u8]) -> Result<Trailer> {
    let eocd_offset = archive
        .len()
        .checked_sub(EndOfCentralDirectory::SIZE)
        .ok_or_else(|| anyhow!("archive shorter than an end record"))?;
    let mut cursor = Cursor::new(&archive[eocd_offset..]);
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != EndOfCentralDirectory::SIGNATURE {
        bail!("Not a valid ZIP file");
    }
    let _disk_number = cursor.read_u16::<LittleEndian>()?;
    let _disk_with_cd = cursor.read_u16::<LittleEndian>()?;
    let _disk_entries = cursor.read_u16::<LittleEndian>()?;
    let total_entries = cursor.read_u16::<LittleEndian>()?;
    let cd_size = cursor.read_u32::<LittleEndian>()?;
    let cd_offset = cursor.read_u32::<LittleEndian>()?;
    if cursor.read_u16::<LittleEndian>()? != 0 {
        bail!("unexpected archive comment");
    }

    let zip64 = total_entries as u64 == ZIP16_LIMIT
        || cd_size as u64 == ZIP32_LIMIT
        || cd_offset as u64 == ZIP32_LIMIT;
    if !zip64 {
        return Ok(Trailer {
            cd_offset: cd_offset as u64,
            cd_size: cd_size as u64,
            total_entries: total_entries as u64,
        });
    }

    let locator_offset = eocd_offset
        .checked_sub(Zip64EOCDLocator::SIZE)
        .ok_or_else(|| anyhow!("missing ZIP64 locator"))?;
    let mut cursor = Cursor::new(&archive[locator_offset..eocd_offset]);
    cursor.read_exact(&mut sig)?;
    if sig != Zip64EOCDLocator::SIGNATURE {
        bail!("Invalid ZIP64 format");
    }
    let _disk_with_eocd64 = cursor.read_u32::<LittleEndian>()?;
    let eocd64_offset = cursor.read_u64::<LittleEndian>()? as usize;

    let record = archive
        .get(eocd64_offset..eocd64_offset + Zip64EOCD::MIN_SIZE)
        .ok_or_else(|| anyhow!("ZIP64 end record out of bounds"))?;
    let mut cursor = Cursor::new(record);
    cursor.read_exact(&mut sig)?;
    if sig != Zip64EOCD::SIGNATURE {
        bail!("Invalid ZIP64 format");
    }
    // size, versions and disk numbers
    cursor.set_position(4 + 8 + 2 + 2 + 4 + 4);
    let _disk_entries = cursor.read_u64::<LittleEndian>()?;
    let total_entries = cursor.read_u64::<LittleEndian>()?;
    let cd_size = cursor.read_u64::<LittleEndian>()?;
    let cd_offset = cursor.read_u64::<LittleEndian>()?;
    Ok(Trailer {
        cd_offset,
        cd_size,
        total_entries,
    })
}

/// Parse a complete archive held in memory.
///
/// Verifies CRCs, sizes and data descriptors along the way.
pub fn read_archive(archive: &[u8]) -> Result<Vec<ReadEntry>> {
    let Trailer {
        cd_offset,
        cd_size,
        total_entries,
    } = read_trailer(archive)?;

    let cd = archive
        .get(cd_offset as usize..(cd_offset + cd_size) as usize)
        .ok_or_else(|| anyhow!("central directory out of bounds"))?;
    let mut cursor = Cursor::new(cd);
    let mut entries = Vec::with_capacity(total_entries as usize);
    for _ in 0..total_entries {
        let mut entry = parse_cdfh(&mut cursor)?;
        entry.data = read_entry_data(archive, &entry)?;
        entries.push(entry);
    }
    if cursor.position() != cd_size {
        bail!("trailing bytes in central directory");
    }
    Ok(entries)
}

fn parse_cdfh(cursor: &mut Cursor<&[u8]>) -> Result<ReadEntry> {
    let mut sig = [0u8; 4];
    cursor.read_exact(&mut sig)?;
    if sig != CDFH_SIGNATURE {
        bail!("Invalid Central Directory File Header");
    }

    let _version_made_by = cursor.read_u16::<LittleEndian>()?;
    let _version_needed = cursor.read_u16::<LittleEndian>()?;
    let flags = cursor.read_u16::<LittleEndian>()?;
    let method = cursor.read_u16::<LittleEndian>()?;
    let dos_time = cursor.read_u16::<LittleEndian>()?;
    let dos_date = cursor.read_u16::<LittleEndian>()?;
    let crc32 = cursor.read_u32::<LittleEndian>()?;
    let mut compressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let mut uncompressed_size = cursor.read_u32::<LittleEndian>()? as u64;
    let name_len = cursor.read_u16::<LittleEndian>()?;
    let extra_len = cursor.read_u16::<LittleEndian>()?;
    let comment_len = cursor.read_u16::<LittleEndian>()?;
    let _disk_start = cursor.read_u16::<LittleEndian>()?;
    let _internal_attrs = cursor.read_u16::<LittleEndian>()?;
    let external_attrs = cursor.read_u32::<LittleEndian>()?;
    let mut lfh_offset = cursor.read_u32::<LittleEndian>()? as u64;

    let mut name = vec![0u8; name_len as usize];
    cursor.read_exact(&mut name)?;
    let name = String::from_utf8(name)?;

    let mut mtime = None;
    let extra_end = cursor.position() + extra_len as u64;
    while cursor.position() + 4 <= extra_end {
        let id = cursor.read_u16::<LittleEndian>()?;
        let size = cursor.read_u16::<LittleEndian>()? as u64;
        let field_end = cursor.position() + size;
        match id {
            EXTRA_ZIP64 => {
                if uncompressed_size == ZIP32_LIMIT {
                    uncompressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if compressed_size == ZIP32_LIMIT {
                    compressed_size = cursor.read_u64::<LittleEndian>()?;
                }
                if lfh_offset == ZIP32_LIMIT {
                    lfh_offset = cursor.read_u64::<LittleEndian>()?;
                }
            }
            EXTRA_EXTENDED_TIMESTAMP => {
                let present = cursor.read_u8()?;
                if present & 1 != 0 {
                    mtime = Some(cursor.read_u32::<LittleEndian>()?);
                }
            }
            _ => {}
        }
        cursor.set_position(field_end);
    }
    cursor.set_position(extra_end + comment_len as u64);

    Ok(ReadEntry {
        name,
        flags,
        method: match method {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            other => bail!("unknown compression method {other}"),
        },
        crc32,
        compressed_size,
        uncompressed_size,
        lfh_offset,
        external_attrs,
        dos_time,
        dos_date,
        mtime,
        data: Vec::new(),
    })
}

fn read_entry_data(archive: &[u8], entry: &ReadEntry) -> Result<Vec<u8>> {
    let lfh = entry.lfh_offset as usize;
    if archive.get(lfh..lfh + 4) != Some(LFH_SIGNATURE) {
        bail!("Invalid Local File Header for {}", entry.name);
    }
    let mut cursor = Cursor::new(&archive[lfh + 26..lfh + LFH_SIZE]);
    let name_len = cursor.read_u16::<LittleEndian>()? as usize;
    let extra_len = cursor.read_u16::<LittleEndian>()? as usize;
    let local_name = &archive[lfh + LFH_SIZE..lfh + LFH_SIZE + name_len];
    if local_name != entry.name.as_bytes() {
        bail!("local header name differs for {}", entry.name);
    }

    let start = lfh + LFH_SIZE + name_len + extra_len;
    let end = start + entry.compressed_size as usize;
    let raw = archive
        .get(start..end)
        .ok_or_else(|| anyhow!("data of {} out of bounds", entry.name))?;

    let data = match entry.method {
        CompressionMethod::Stored => raw.to_vec(),
        CompressionMethod::Deflate => {
            let mut out = Vec::new();
            flate2::read::DeflateDecoder::new(raw).read_to_end(&mut out)?;
            out
        }
    };
    if data.len() as u64 != entry.uncompressed_size {
        bail!("size mismatch for {}", entry.name);
    }
    if crc32fast::hash(&data) != entry.crc32 {
        bail!("crc mismatch for {}", entry.name);
    }

    if entry.flags & FLAG_DATA_DESCRIPTOR != 0 {
        let mut cursor = Cursor::new(&archive[end..]);
        let mut sig = [0u8; 4];
        cursor.read_exact(&mut sig)?;
        if sig != DATA_DESCRIPTOR_SIGNATURE {
            bail!("missing data descriptor for {}", entry.name);
        }
        if cursor.read_u32::<LittleEndian>()? != entry.crc32 {
            bail!("descriptor crc differs for {}", entry.name);
        }
    }
    Ok(data)
}

/// Drain a pipe, returning the bytes read and the terminating error, if any.
pub async fn drain(mut reader: PipeReader) -> (Vec<u8>, Option<io::Error>) {
    let mut data = Vec::new();
    while let Some(item) = reader.next().await {
        match item {
            Ok(chunk) => data.extend_from_slice(&chunk),
            Err(e) => return (data, Some(e)),
        }
    }
    (data, None)
}

/// Wraps a store, counting listings and recording which keys were opened.
pub struct CountingStore<S> {
    pub inner: S,
    pub list_calls: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl<S> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            list_calls: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for CountingStore<S> {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.list_page(prefix, token).await
    }

    async fn open(&self, key: &str) -> Result<ObjectReader> {
        self.opened.lock().unwrap().push(key.to_string());
        self.inner.open(key).await
    }
}

/// Wraps a store, failing chosen operations.
pub struct FaultyStore<S> {
    pub inner: S,
    /// Keys whose fetch fails
    pub failing_keys: HashSet<String>,
    /// Listing call (0-based) that fails
    pub fail_list_call: Option<usize>,
    list_calls: AtomicUsize,
}

impl<S> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing_keys: HashSet::new(),
            fail_list_call: None,
            list_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_key(mut self, key: &str) -> Self {
        self.failing_keys.insert(key.to_string());
        self
    }

    pub fn fail_listing_at(mut self, call: usize) -> Self {
        self.fail_list_call = Some(call);
        self
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for FaultyStore<S> {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_call == Some(call) {
            bail!("AccessDenied: listing refused");
        }
        self.inner.list_page(prefix, token).await
    }

    async fn open(&self, key: &str) -> Result<ObjectReader> {
        if self.failing_keys.contains(key) {
            bail!("NoSuchKey: {key}");
        }
        self.inner.open(key).await
    }
}

/// Wraps a store whose fetches wait until released.
pub struct GatedStore<S> {
    pub inner: S,
    pub gate: Notify,
    pub opens: AtomicUsize,
}

impl<S> GatedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gate: Notify::new(),
            opens: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for GatedStore<S> {
    async fn list_page(&self, prefix: &str, token: Option<&str>) -> Result<ListPage> {
        self.inner.list_page(prefix, token).await
    }

    async fn open(&self, key: &str) -> Result<ObjectReader> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.inner.open(key).await
    }
}

/// Store whose listing requests never complete.
pub struct StalledListingStore;

#[async_trait]
impl ObjectStore for StalledListingStore {
    async fn list_page(&self, _prefix: &str, _token: Option<&str>) -> Result<ListPage> {
        std::future::pending().await
    }

    async fn open(&self, key: &str) -> Result<ObjectReader> {
        bail!("unexpected fetch of {key}")
    }
}
