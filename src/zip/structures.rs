use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::io::{self, Write};

/// Compression methods the writer can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
}

impl CompressionMethod {
    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }
}

/// Version needed to extract: 2.0 (deflate, directories).
pub const VERSION_DEFAULT: u16 = 20;
/// Version needed to extract: 4.5 (ZIP64).
pub const VERSION_ZIP64: u16 = 45;
/// Made by: UNIX host, spec version 4.5.
pub const VERSION_MADE_BY: u16 = (3 << 8) | VERSION_ZIP64;

/// General purpose flag: CRC and sizes follow the data in a descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
/// General purpose flag: file name is UTF-8.
pub const FLAG_UTF8: u16 = 0x0800;

/// Largest value a 16-bit field holds before ZIP64 is needed.
pub const ZIP16_LIMIT: u64 = 0xFFFF;
/// Largest value a 32-bit field holds before ZIP64 is needed.
pub const ZIP32_LIMIT: u64 = 0xFFFF_FFFF;

/// Extra field header ids.
pub const EXTRA_ZIP64: u16 = 0x0001;
pub const EXTRA_EXTENDED_TIMESTAMP: u16 = 0x5455;

/// External attributes: regular file, rw-r--r--.
pub const ATTRS_FILE: u32 = 0o100644 << 16;
/// External attributes: directory, rwxr-xr-x, plus the MS-DOS directory bit.
pub const ATTRS_DIRECTORY: u32 = (0o040755 << 16) | 0x10;

/// MS-DOS packed date and time as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Pack a UTC timestamp, clamped to the 1980..=2107 range DOS can hold.
    pub fn from_utc(t: &DateTime<Utc>) -> Self {
        let t = if t.year() < 1980 {
            Utc.with_ymd_and_hms(1980, 1, 1, 0, 0, 0).single().unwrap_or(*t)
        } else if t.year() > 2107 {
            Utc.with_ymd_and_hms(2107, 12, 31, 23, 59, 58)
                .single()
                .unwrap_or(*t)
        } else {
            *t
        };

        let date = (((t.year() - 1980) as u16) << 9) | ((t.month() as u16) << 5) | t.day() as u16;
        let time =
            ((t.hour() as u16) << 11) | ((t.minute() as u16) << 5) | (t.second() as u16 / 2);
        Self { time, date }
    }
}

/// Extended timestamp extra field carrying the Unix modification time.
pub fn extended_timestamp_extra(t: &DateTime<Utc>) -> Vec<u8> {
    let mtime = t.timestamp().clamp(0, u32::MAX as i64) as u32;
    let mut extra = Vec::with_capacity(9);
    extra.extend_from_slice(&EXTRA_EXTENDED_TIMESTAMP.to_le_bytes());
    extra.extend_from_slice(&5u16.to_le_bytes());
    extra.push(0x01); // mtime present
    extra.extend_from_slice(&mtime.to_le_bytes());
    extra
}

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Local file header written in front of each entry's data.
///
/// Streamed entries leave CRC and sizes zero and set
/// [`FLAG_DATA_DESCRIPTOR`]; the real values follow the data.
pub struct LocalFileHeader<'a> {
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub file_name: &'a [u8],
    pub extra: &'a [u8],
}

impl LocalFileHeader<'_> {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(LFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.modified.time)?;
        out.write_u16::<LittleEndian>(self.modified.date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(self.compressed_size)?;
        out.write_u32::<LittleEndian>(self.uncompressed_size)?;
        out.write_u16::<LittleEndian>(len_u16(self.file_name.len(), "file name")?)?;
        out.write_u16::<LittleEndian>(len_u16(self.extra.len(), "extra field")?)?;
        out.write_all(self.file_name)?;
        out.write_all(self.extra)?;
        Ok(())
    }
}

/// Data descriptor - 16 bytes, 24 bytes for ZIP64 entries
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8] = b"PK\x07\x08";

pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub zip64: bool,
}

impl DataDescriptor {
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(DATA_DESCRIPTOR_SIGNATURE)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        if self.zip64 {
            out.write_u64::<LittleEndian>(self.compressed_size)?;
            out.write_u64::<LittleEndian>(self.uncompressed_size)?;
        } else {
            out.write_u32::<LittleEndian>(self.compressed_size as u32)?;
            out.write_u32::<LittleEndian>(self.uncompressed_size as u32)?;
        }
        Ok(())
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Central directory record for one entry, kept until the archive is closed.
#[derive(Debug, Clone)]
pub struct CentralDirectoryHeader {
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub lfh_offset: u64,
    pub file_name: Vec<u8>,
    /// Extra fields other than ZIP64, which is derived on write.
    pub extra: Vec<u8>,
    pub external_attrs: u32,
}

impl CentralDirectoryHeader {
    pub fn needs_zip64(&self) -> bool {
        self.compressed_size >= ZIP32_LIMIT
            || self.uncompressed_size >= ZIP32_LIMIT
            || self.lfh_offset >= ZIP32_LIMIT
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        // ZIP64 fields appear only for header fields set to 0xFFFFFFFF,
        // in the order uncompressed, compressed, offset.
        let mut zip64 = Vec::new();
        let mut field32 = |value: u64| -> io::Result<u32> {
            if value >= ZIP32_LIMIT {
                zip64.write_u64::<LittleEndian>(value)?;
                Ok(u32::MAX)
            } else {
                Ok(value as u32)
            }
        };
        let uncompressed_size = field32(self.uncompressed_size)?;
        let compressed_size = field32(self.compressed_size)?;
        let lfh_offset = field32(self.lfh_offset)?;

        let mut extra = Vec::with_capacity(self.extra.len() + zip64.len() + 4);
        if !zip64.is_empty() {
            extra.write_u16::<LittleEndian>(EXTRA_ZIP64)?;
            extra.write_u16::<LittleEndian>(zip64.len() as u16)?;
            extra.extend_from_slice(&zip64);
        }
        extra.extend_from_slice(&self.extra);

        let version_needed = if self.needs_zip64() {
            VERSION_ZIP64
        } else {
            VERSION_DEFAULT
        };

        out.write_all(CDFH_SIGNATURE)?;
        out.write_u16::<LittleEndian>(VERSION_MADE_BY)?;
        out.write_u16::<LittleEndian>(version_needed)?;
        out.write_u16::<LittleEndian>(self.flags)?;
        out.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        out.write_u16::<LittleEndian>(self.modified.time)?;
        out.write_u16::<LittleEndian>(self.modified.date)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_u32::<LittleEndian>(compressed_size)?;
        out.write_u32::<LittleEndian>(uncompressed_size)?;
        out.write_u16::<LittleEndian>(len_u16(self.file_name.len(), "file name")?)?;
        out.write_u16::<LittleEndian>(len_u16(extra.len(), "extra field")?)?;
        out.write_u16::<LittleEndian>(0)?; // comment length
        out.write_u16::<LittleEndian>(0)?; // disk number start
        out.write_u16::<LittleEndian>(0)?; // internal attributes
        out.write_u32::<LittleEndian>(self.external_attrs)?;
        out.write_u32::<LittleEndian>(lfh_offset)?;
        out.write_all(&self.file_name)?;
        out.write_all(&extra)?;
        Ok(())
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Record for a single-disk archive, saturating fields that need ZIP64.
    pub fn new(total_entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        let entries = total_entries.min(ZIP16_LIMIT) as u16;
        Self {
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: entries,
            total_entries: entries,
            cd_size: cd_size.min(ZIP32_LIMIT) as u32,
            cd_offset: cd_offset.min(ZIP32_LIMIT) as u32,
            comment_len: 0,
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u16::<LittleEndian>(self.disk_number)?;
        out.write_u16::<LittleEndian>(self.disk_with_cd)?;
        out.write_u16::<LittleEndian>(self.disk_entries)?;
        out.write_u16::<LittleEndian>(self.total_entries)?;
        out.write_u32::<LittleEndian>(self.cd_size)?;
        out.write_u32::<LittleEndian>(self.cd_offset)?;
        out.write_u16::<LittleEndian>(self.comment_len)?;
        Ok(())
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u32::<LittleEndian>(self.disk_with_eocd64)?;
        out.write_u64::<LittleEndian>(self.eocd64_offset)?;
        out.write_u32::<LittleEndian>(self.total_disks)?;
        Ok(())
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn new(total_entries: u64, cd_size: u64, cd_offset: u64) -> Self {
        Self {
            // Size of the record excluding the leading 12 bytes
            eocd64_size: (Self::MIN_SIZE - 12) as u64,
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_ZIP64,
            disk_number: 0,
            disk_with_cd: 0,
            disk_entries: total_entries,
            total_entries,
            cd_size,
            cd_offset,
        }
    }

    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        out.write_all(Self::SIGNATURE)?;
        out.write_u64::<LittleEndian>(self.eocd64_size)?;
        out.write_u16::<LittleEndian>(self.version_made_by)?;
        out.write_u16::<LittleEndian>(self.version_needed)?;
        out.write_u32::<LittleEndian>(self.disk_number)?;
        out.write_u32::<LittleEndian>(self.disk_with_cd)?;
        out.write_u64::<LittleEndian>(self.disk_entries)?;
        out.write_u64::<LittleEndian>(self.total_entries)?;
        out.write_u64::<LittleEndian>(self.cd_size)?;
        out.write_u64::<LittleEndian>(self.cd_offset)?;
        Ok(())
    }
}

fn len_u16(len: usize, what: &str) -> io::Result<u16> {
    u16::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{what} too long: {len} bytes"),
        )
    })
}
