//! Streaming ZIP writer.
//!
//! Entries are written front to back with no seeking: each local header
//! goes out with CRC and sizes unknown, the data follows as it arrives, and
//! a data descriptor carries the real values. The central directory is kept
//! in memory (one small record per entry) and written by [`ZipStreamWriter::finish`].

use std::io;

use chrono::{DateTime, Utc};
use flate2::{Compress, Compression, FlushCompress, Status};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::structures::*;

/// Deflate output buffer size.
const DEFLATE_CHUNK: usize = 64 * 1024;

/// State of the entry currently being written.
struct OpenEntry {
    header: CentralDirectoryHeader,
    hasher: crc32fast::Hasher,
    zip64: bool,
    compressor: Option<Compress>,
}

/// Writes a ZIP archive to an [`AsyncWrite`] one entry at a time.
pub struct ZipStreamWriter<W> {
    out: W,
    /// Bytes written to `out` so far
    offset: u64,
    method: CompressionMethod,
    central_directory: Vec<CentralDirectoryHeader>,
    current: Option<OpenEntry>,
    scratch: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> ZipStreamWriter<W> {
    pub fn new(out: W, method: CompressionMethod) -> Self {
        Self {
            out,
            offset: 0,
            method,
            central_directory: Vec::new(),
            current: None,
            scratch: Vec::new(),
        }
    }

    /// Bytes emitted so far.
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Write a zero-length directory entry. `name` must end with `/`.
    pub async fn add_directory(&mut self, name: &str, modified: &DateTime<Utc>) -> io::Result<()> {
        self.ensure_closed()?;

        let header = CentralDirectoryHeader {
            flags: name_flags(name),
            compression_method: CompressionMethod::Stored,
            modified: DosDateTime::from_utc(modified),
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            lfh_offset: self.offset,
            file_name: name.as_bytes().to_vec(),
            extra: extended_timestamp_extra(modified),
            external_attrs: ATTRS_DIRECTORY,
        };

        let mut buf = Vec::with_capacity(LFH_SIZE + header.file_name.len() + header.extra.len());
        LocalFileHeader {
            version_needed: VERSION_DEFAULT,
            flags: header.flags,
            compression_method: header.compression_method,
            modified: header.modified,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name: &header.file_name,
            extra: &header.extra,
        }
        .write_to(&mut buf)?;
        self.emit(&buf).await?;

        self.central_directory.push(header);
        Ok(())
    }

    /// Start a file entry; follow with [`write_data`](Self::write_data) and
    /// [`finish_file`](Self::finish_file).
    ///
    /// `size_hint` is the expected uncompressed size. Entries whose hint
    /// reaches 4 GiB are written with ZIP64 sizes.
    pub async fn start_file(
        &mut self,
        name: &str,
        modified: &DateTime<Utc>,
        size_hint: u64,
    ) -> io::Result<()> {
        self.ensure_closed()?;

        let zip64 = size_hint >= ZIP32_LIMIT;
        let header = CentralDirectoryHeader {
            flags: name_flags(name) | FLAG_DATA_DESCRIPTOR,
            compression_method: self.method,
            modified: DosDateTime::from_utc(modified),
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            lfh_offset: self.offset,
            file_name: name.as_bytes().to_vec(),
            extra: extended_timestamp_extra(modified),
            external_attrs: ATTRS_FILE,
        };

        let mut extra = Vec::with_capacity(header.extra.len() + 20);
        if zip64 {
            // Sizes are unknown here; the descriptor carries them
            extra.extend_from_slice(&EXTRA_ZIP64.to_le_bytes());
            extra.extend_from_slice(&16u16.to_le_bytes());
            extra.extend_from_slice(&[0u8; 16]);
        }
        extra.extend_from_slice(&header.extra);

        let sentinel = if zip64 { u32::MAX } else { 0 };
        let mut buf = Vec::with_capacity(LFH_SIZE + header.file_name.len() + extra.len());
        LocalFileHeader {
            version_needed: if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT },
            flags: header.flags,
            compression_method: header.compression_method,
            modified: header.modified,
            crc32: 0,
            compressed_size: sentinel,
            uncompressed_size: sentinel,
            file_name: &header.file_name,
            extra: &extra,
        }
        .write_to(&mut buf)?;
        self.emit(&buf).await?;

        let compressor = match self.method {
            CompressionMethod::Deflate => Some(Compress::new(Compression::default(), false)),
            _ => None,
        };
        self.current = Some(OpenEntry {
            header,
            hasher: crc32fast::Hasher::new(),
            zip64,
            compressor,
        });
        Ok(())
    }

    /// Append uncompressed bytes to the open entry.
    pub async fn write_data(&mut self, data: &[u8]) -> io::Result<()> {
        let Some(entry) = self.current.as_mut() else {
            return Err(no_open_entry());
        };
        entry.hasher.update(data);
        entry.header.uncompressed_size += data.len() as u64;
        if !entry.zip64 && entry.header.uncompressed_size >= ZIP32_LIMIT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "entry grew past 4 GiB without ZIP64 headers",
            ));
        }

        if entry.compressor.is_some() {
            self.deflate(data, FlushCompress::None).await
        } else {
            self.emit_entry_data(data).await
        }
    }

    /// Close the open entry, writing its data descriptor.
    ///
    /// Returns the uncompressed size of the entry.
    pub async fn finish_file(&mut self) -> io::Result<u64> {
        if self
            .current
            .as_ref()
            .is_some_and(|entry| entry.compressor.is_some())
        {
            self.deflate(&[], FlushCompress::Finish).await?;
        }

        let Some(entry) = self.current.take() else {
            return Err(no_open_entry());
        };
        let mut header = entry.header;
        header.crc32 = entry.hasher.finalize();

        if !entry.zip64 && header.compressed_size >= ZIP32_LIMIT {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "compressed entry grew past 4 GiB without ZIP64 headers",
            ));
        }

        let mut buf = Vec::with_capacity(24);
        DataDescriptor {
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            zip64: entry.zip64,
        }
        .write_to(&mut buf)?;
        self.emit(&buf).await?;

        let size = header.uncompressed_size;
        self.central_directory.push(header);
        Ok(size)
    }

    /// Write the central directory and end records, then flush.
    ///
    /// Returns the output and the total archive length.
    pub async fn finish(mut self) -> io::Result<(W, u64)> {
        self.ensure_closed()?;

        let cd_offset = self.offset;
        let mut buf = Vec::new();
        for header in &self.central_directory {
            header.write_to(&mut buf)?;
        }
        let cd_size = buf.len() as u64;
        let total_entries = self.central_directory.len() as u64;

        if total_entries >= ZIP16_LIMIT || cd_size >= ZIP32_LIMIT || cd_offset >= ZIP32_LIMIT {
            let eocd64_offset = cd_offset + cd_size;
            Zip64EOCD::new(total_entries, cd_size, cd_offset).write_to(&mut buf)?;
            Zip64EOCDLocator {
                disk_with_eocd64: 0,
                eocd64_offset,
                total_disks: 1,
            }
            .write_to(&mut buf)?;
        }
        EndOfCentralDirectory::new(total_entries, cd_size, cd_offset).write_to(&mut buf)?;

        self.emit(&buf).await?;
        self.out.flush().await?;
        Ok((self.out, self.offset))
    }

    async fn deflate(&mut self, mut input: &[u8], flush: FlushCompress) -> io::Result<()> {
        loop {
            let Some(compressor) = self.current.as_mut().and_then(|e| e.compressor.as_mut()) else {
                return Err(no_open_entry());
            };

            self.scratch.clear();
            self.scratch.reserve(DEFLATE_CHUNK);
            let before = compressor.total_in();
            let status = compressor
                .compress_vec(input, &mut self.scratch, flush)
                .map_err(io::Error::other)?;
            let consumed = (compressor.total_in() - before) as usize;
            input = &input[consumed..];

            if !self.scratch.is_empty() {
                let chunk = std::mem::take(&mut self.scratch);
                let result = self.emit_entry_data(&chunk).await;
                self.scratch = chunk;
                result?;
            }

            let done = match flush {
                FlushCompress::Finish => status == Status::StreamEnd,
                _ => input.is_empty(),
            };
            if done {
                return Ok(());
            }
        }
    }

    async fn emit_entry_data(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(entry) = self.current.as_mut() {
            entry.header.compressed_size += data.len() as u64;
        }
        self.emit(data).await
    }

    async fn emit(&mut self, data: &[u8]) -> io::Result<()> {
        self.out.write_all(data).await?;
        self.offset += data.len() as u64;
        Ok(())
    }

    fn ensure_closed(&self) -> io::Result<()> {
        if self.current.is_some() {
            return Err(io::Error::other("previous entry was not finished"));
        }
        Ok(())
    }
}

fn name_flags(name: &str) -> u16 {
    if name.is_ascii() { 0 } else { FLAG_UTF8 }
}

fn no_open_entry() -> io::Error {
    io::Error::other("no entry is open")
}
