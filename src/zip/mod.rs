//! ZIP archive construction.
//!
//! ## Architecture
//!
//! - [`structures`]: ZIP format records (local headers, data descriptors,
//!   central directory, EOCD and its ZIP64 variants) and their byte layout
//! - [`writer`]: a forward-only writer that streams entries into any
//!   `AsyncWrite`
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The writer never seeks back: CRC-32 and sizes of file entries are
//! written after the data in a data descriptor, and repeated in the
//! Central Directory at the end.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for entries and archives > 4GB
//! - STORED (no compression) and DEFLATE methods
//! - UTF-8 names and extended timestamps
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support

mod structures;
mod writer;

pub use structures::*;
pub use writer::ZipStreamWriter;
