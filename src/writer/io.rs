// Low level file and block handling utilities for MdfWriter
use alloc::format;
use alloc::string::ToString;
use alloc::vec;

use super::MdfWriter;
use crate::{Error, Result};

/// Trait for write operations used by [`MdfWriter`].
///
/// Abstracts the write and seek operations needed for MDF file creation.
/// Implemented for buffered file I/O when the `std` feature is enabled,
/// and for in-memory buffers in `no_std` environments.
pub trait MdfWrite {
    /// Write all bytes to the destination.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Seek to an absolute position.
    fn seek(&mut self, pos: u64) -> Result<u64>;

    /// Get the current position.
    fn position(&self) -> u64;

    /// Flush any buffered data.
    fn flush(&mut self) -> Result<()>;
}

/// A writer that writes to an in-memory buffer.
///
/// Available in both `std` and `no_std` environments, useful for creating
/// MDF data in memory before writing to external storage.
pub struct VecWriter {
    buffer: alloc::vec::Vec<u8>,
    position: u64,
}

impl VecWriter {
    /// Create a new VecWriter with an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: alloc::vec::Vec::new(),
            position: 0,
        }
    }

    /// Create a new VecWriter with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: alloc::vec::Vec::with_capacity(capacity),
            position: 0,
        }
    }

    /// Consume the writer and return the underlying buffer.
    pub fn into_inner(self) -> alloc::vec::Vec<u8> {
        self.buffer
    }

    /// Get a reference to the underlying buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the total length of the written data.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for VecWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl MdfWrite for VecWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let pos = self.position as usize;
        let end = pos + bytes.len();

        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }

        self.buffer[pos..end].copy_from_slice(bytes);
        self.position = end as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        self.position = pos;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(feature = "std")]
mod std_impl {
    use super::MdfWrite;
    use crate::Result;
    use std::fs::{File, OpenOptions};
    use std::io::{BufWriter, Seek, SeekFrom, Write};
    use std::path::Path;

    /// A wrapper that implements [`MdfWrite`] for buffered file I/O.
    pub struct FileWriter {
        inner: BufWriter<File>,
        position: u64,
    }

    impl FileWriter {
        /// Create a new FileWriter for the given file path, truncating any
        /// existing file. Uses a 1 MB buffer.
        pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
            Self::create_with_capacity(path, 1_048_576)
        }

        /// Create a new FileWriter with the specified buffer capacity.
        pub fn create_with_capacity<P: AsRef<Path>>(path: P, capacity: usize) -> Result<Self> {
            let file = File::create(path)?;
            let inner = BufWriter::with_capacity(capacity, file);
            Ok(Self { inner, position: 0 })
        }

        /// Open an existing file read+write, positioned at its end, for
        /// appending new blocks to a finalized measurement.
        pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self> {
            let mut file = OpenOptions::new().read(true).write(true).open(path)?;
            let position = file.seek(SeekFrom::End(0))?;
            let inner = BufWriter::with_capacity(1_048_576, file);
            Ok(Self { inner, position })
        }
    }

    impl MdfWrite for FileWriter {
        fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
            self.inner.write_all(bytes)?;
            self.position += bytes.len() as u64;
            Ok(())
        }

        fn seek(&mut self, pos: u64) -> Result<u64> {
            self.inner.seek(SeekFrom::Start(pos))?;
            self.position = pos;
            Ok(self.position)
        }

        fn position(&self) -> u64 {
            self.position
        }

        fn flush(&mut self) -> Result<()> {
            self.inner.flush()?;
            Ok(())
        }
    }
}

#[cfg(feature = "std")]
pub use std_impl::FileWriter;

#[cfg(feature = "std")]
impl MdfWriter<FileWriter> {
    /// Creates a new MdfWriter for the given file path using a 1 MB
    /// internal buffer.
    pub fn new(path: &str) -> Result<Self> {
        Self::new_with_capacity(path, 1_048_576)
    }

    /// Creates a new MdfWriter with the specified `BufWriter` capacity.
    pub fn new_with_capacity(path: &str, capacity: usize) -> Result<Self> {
        let file_writer = FileWriter::create_with_capacity(path, capacity)?;
        Ok(Self::from_writer(file_writer))
    }
}

impl<W: MdfWrite> MdfWriter<W> {
    /// Writes a block to the file, aligning to 8 bytes and zero-padding as
    /// needed. Returns the starting offset of the block in the file.
    pub fn write_block(&mut self, block_bytes: &[u8]) -> Result<u64> {
        let align = (8 - (self.offset % 8)) % 8;
        if align != 0 {
            let padding = vec![0u8; align as usize];
            self.writer.write_all(&padding)?;
            self.offset += align;
        }

        self.writer.write_all(block_bytes)?;
        let block_start = self.offset;
        self.offset += block_bytes.len() as u64;
        Ok(block_start)
    }

    /// Writes a block to the file and tracks its position with the given ID.
    pub fn write_block_with_id(&mut self, block_bytes: &[u8], block_id: &str) -> Result<u64> {
        let block_start = self.write_block(block_bytes)?;
        self.block_positions
            .insert(block_id.to_string(), block_start);
        Ok(block_start)
    }

    /// Retrieves the file position of a previously written block.
    pub fn get_block_position(&self, block_id: &str) -> Option<u64> {
        self.block_positions.get(block_id).copied()
    }

    /// Updates a link (u64 address) at a specific offset in the file.
    pub fn update_link(&mut self, offset: u64, address: u64) -> Result<()> {
        let current_pos = self.offset;
        self.writer.seek(offset)?;
        self.writer.write_all(&address.to_le_bytes())?;
        self.writer.seek(current_pos)?;
        Ok(())
    }

    /// Updates a link using block IDs instead of raw offsets.
    pub fn update_block_link(
        &mut self,
        source_id: &str,
        link_offset: u64,
        target_id: &str,
    ) -> Result<()> {
        let source_pos = self.get_block_position(source_id).ok_or_else(|| {
            Error::BlockLinkError(format!("Source block '{}' not found", source_id))
        })?;
        let target_pos = self.get_block_position(target_id).ok_or_else(|| {
            Error::BlockLinkError(format!("Target block '{}' not found", target_id))
        })?;
        let link_pos = source_pos + link_offset;
        self.update_link(link_pos, target_pos)
    }

    fn update_u32(&mut self, offset: u64, value: u32) -> Result<()> {
        let current_pos = self.offset;
        self.writer.seek(offset)?;
        self.writer.write_all(&value.to_le_bytes())?;
        self.writer.seek(current_pos)?;
        Ok(())
    }

    fn update_u64(&mut self, offset: u64, value: u64) -> Result<()> {
        let current_pos = self.offset;
        self.writer.seek(offset)?;
        self.writer.write_all(&value.to_le_bytes())?;
        self.writer.seek(current_pos)?;
        Ok(())
    }

    fn update_u8(&mut self, offset: u64, value: u8) -> Result<()> {
        let current_pos = self.offset;
        self.writer.seek(offset)?;
        self.writer.write_all(&[value])?;
        self.writer.seek(current_pos)?;
        Ok(())
    }

    pub(super) fn update_block_u32(
        &mut self,
        block_id: &str,
        field_offset: u64,
        value: u32,
    ) -> Result<()> {
        let block_pos = self
            .get_block_position(block_id)
            .ok_or_else(|| Error::BlockLinkError(format!("Block '{}' not found", block_id)))?;
        self.update_u32(block_pos + field_offset, value)
    }

    pub(super) fn update_block_u8(
        &mut self,
        block_id: &str,
        field_offset: u64,
        value: u8,
    ) -> Result<()> {
        let block_pos = self
            .get_block_position(block_id)
            .ok_or_else(|| Error::BlockLinkError(format!("Block '{}' not found", block_id)))?;
        self.update_u8(block_pos + field_offset, value)
    }

    pub(super) fn update_block_u64(
        &mut self,
        block_id: &str,
        field_offset: u64,
        value: u64,
    ) -> Result<()> {
        let block_pos = self
            .get_block_position(block_id)
            .ok_or_else(|| Error::BlockLinkError(format!("Block '{}' not found", block_id)))?;
        self.update_u64(block_pos + field_offset, value)
    }

    /// Returns the current file offset (for block address calculation).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Finalizes the file (flushes all data to disk).
    pub fn finalize(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
