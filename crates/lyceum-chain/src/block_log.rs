//! Append-only log of irreversible blocks.
//!
//! Frame layout: `[payload len: u32 LE][crc32 of payload: u32 LE][bincode
//! block]`. The offset index lives in memory and is rebuilt by walking the
//! frames on open; a torn tail frame (crash mid-append) is truncated away
//! with a warning, while corruption before the tail is a hard error.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::io::Write as _;
use std::path::Path;

use lyceum_types::SignedBlock;
use tracing::{debug, warn};

use crate::error::ChainError;

const FRAME_HEADER_BYTES: u64 = 8;

enum Backing {
    File(File),
    Memory(Vec<u8>),
}

/// The canonical history below the irreversible boundary. Block `n` lives
/// in frame `n - 1`; the head block is cached for cheap access.
pub struct BlockLog {
    backing: Backing,
    offsets: Vec<u64>,
    head: Option<SignedBlock>,
}

impl BlockLog {
    /// Opens (or creates) a log file and rebuilds the frame index.
    pub fn open(path: &Path) -> Result<Self, ChainError> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let mut log = Self {
            backing: Backing::File(file),
            offsets: Vec::new(),
            head: None,
        };
        log.rebuild_index()?;
        Ok(log)
    }

    /// A volatile log for embedded and test databases.
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::Memory(Vec::new()),
            offsets: Vec::new(),
            head: None,
        }
    }

    /// Number of the newest logged block, 0 when empty.
    pub fn last_block_num(&self) -> u32 {
        self.offsets.len() as u32
    }

    pub fn head(&self) -> Option<&SignedBlock> {
        self.head.as_ref()
    }

    /// Appends the next sequential block and returns its frame offset.
    pub fn append(&mut self, block: &SignedBlock) -> Result<u64, ChainError> {
        assert_eq!(
            block.block_num(),
            self.last_block_num() + 1,
            "block log appends must be sequential"
        );
        let payload = bincode::serialize(block).expect("blocks always serialize");
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let mut frame = Vec::with_capacity(payload.len() + FRAME_HEADER_BYTES as usize);
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&payload);

        let offset = self.file_len();
        match &mut self.backing {
            Backing::File(file) => {
                file.write_all(&frame)?;
                file.flush()?;
            }
            Backing::Memory(buf) => buf.extend_from_slice(&frame),
        }
        self.offsets.push(offset);
        self.head = Some(block.clone());
        debug!(num = block.block_num(), offset, "block logged");
        Ok(offset)
    }

    /// Reads block `num`, or `None` when the log has no such block.
    pub fn read_block(&self, num: u32) -> Result<Option<SignedBlock>, ChainError> {
        if num == 0 || num > self.last_block_num() {
            return Ok(None);
        }
        let offset = self.offsets[(num - 1) as usize];
        let frame = self.read_frame(offset)?;
        Ok(Some(frame))
    }

    fn file_len(&self) -> u64 {
        match &self.backing {
            Backing::File(file) => file.metadata().map(|m| m.len()).unwrap_or(0),
            Backing::Memory(buf) => buf.len() as u64,
        }
    }

    fn read_frame(&self, offset: u64) -> Result<SignedBlock, ChainError> {
        let mut header = [0u8; FRAME_HEADER_BYTES as usize];
        self.read_exact_at(offset, &mut header)?;
        let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let stored_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let mut payload = vec![0u8; len];
        self.read_exact_at(offset + FRAME_HEADER_BYTES, &mut payload)?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != stored_crc {
            return Err(ChainError::CorruptBlockLog {
                offset,
                reason: "crc mismatch".to_string(),
            });
        }
        bincode::deserialize(&payload).map_err(|e| ChainError::CorruptBlockLog {
            offset,
            reason: e.to_string(),
        })
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), ChainError> {
        match &self.backing {
            Backing::File(file) => {
                let mut reader = file;
                reader.seek(SeekFrom::Start(offset))?;
                reader.read_exact(buf)?;
                Ok(())
            }
            Backing::Memory(bytes) => {
                let start = offset as usize;
                let end = start + buf.len();
                if end > bytes.len() {
                    return Err(ChainError::CorruptBlockLog {
                        offset,
                        reason: "frame extends past end of log".to_string(),
                    });
                }
                buf.copy_from_slice(&bytes[start..end]);
                Ok(())
            }
        }
    }

    /// Walks the frames from the start, recording offsets and caching the
    /// head. Truncates at the first unreadable frame.
    fn rebuild_index(&mut self) -> Result<(), ChainError> {
        self.offsets.clear();
        self.head = None;
        let total = self.file_len();
        let mut offset = 0u64;
        let mut good_end = 0u64;

        while offset + FRAME_HEADER_BYTES <= total {
            let mut header = [0u8; FRAME_HEADER_BYTES as usize];
            self.read_exact_at(offset, &mut header)?;
            let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
            if offset + FRAME_HEADER_BYTES + len > total {
                break;
            }
            match self.read_frame(offset) {
                Ok(block) => {
                    self.offsets.push(offset);
                    self.head = Some(block);
                    offset += FRAME_HEADER_BYTES + len;
                    good_end = offset;
                }
                Err(_) => break,
            }
        }

        if good_end < total {
            warn!(
                kept_blocks = self.offsets.len(),
                dropped_bytes = total - good_end,
                "truncating torn tail of block log"
            );
            self.truncate_to(good_end)?;
        }
        Ok(())
    }

    fn truncate_to(&mut self, len: u64) -> Result<(), ChainError> {
        match &mut self.backing {
            Backing::File(file) => file.set_len(len)?,
            Backing::Memory(buf) => buf.truncate(len as usize),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use lyceum_types::{BlockId, ChainTime};

    use super::*;

    fn block_chain(len: u32) -> Vec<SignedBlock> {
        let mut blocks = Vec::new();
        let mut previous = BlockId::default();
        for i in 0..len {
            let mut block = SignedBlock::default();
            block.header.previous = previous;
            block.header.timestamp = ChainTime::from_secs(3 * (i + 1));
            previous = block.id();
            blocks.push(block);
        }
        blocks
    }

    #[test]
    fn append_and_read_back() {
        let mut log = BlockLog::in_memory();
        let blocks = block_chain(3);
        for b in &blocks {
            log.append(b).unwrap();
        }
        assert_eq!(log.last_block_num(), 3);
        assert_eq!(log.head().unwrap().id(), blocks[2].id());
        let read = log.read_block(2).unwrap().unwrap();
        assert_eq!(read.id(), blocks[1].id());
        assert!(log.read_block(4).unwrap().is_none());
        assert!(log.read_block(0).unwrap().is_none());
    }

    #[test]
    #[should_panic(expected = "sequential")]
    fn out_of_order_append_panics() {
        let mut log = BlockLog::in_memory();
        let blocks = block_chain(2);
        log.append(&blocks[1]).unwrap();
    }

    #[test]
    fn reopen_rebuilds_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.log");
        let blocks = block_chain(4);
        {
            let mut log = BlockLog::open(&path).unwrap();
            for b in &blocks {
                log.append(b).unwrap();
            }
        }
        let log = BlockLog::open(&path).unwrap();
        assert_eq!(log.last_block_num(), 4);
        assert_eq!(log.head().unwrap().id(), blocks[3].id());
        assert_eq!(log.read_block(1).unwrap().unwrap().id(), blocks[0].id());
    }

    #[test]
    fn torn_tail_is_truncated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.log");
        let blocks = block_chain(2);
        {
            let mut log = BlockLog::open(&path).unwrap();
            for b in &blocks {
                log.append(b).unwrap();
            }
        }
        // Simulate a crash mid-append: a frame header with no payload.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[64, 0, 0, 0, 1, 2, 3, 4]).unwrap();
        }
        let log = BlockLog::open(&path).unwrap();
        assert_eq!(log.last_block_num(), 2);
        assert_eq!(log.head().unwrap().id(), blocks[1].id());
    }

    #[test]
    fn corrupt_payload_stops_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blocks.log");
        let blocks = block_chain(2);
        let second_offset;
        {
            let mut log = BlockLog::open(&path).unwrap();
            log.append(&blocks[0]).unwrap();
            second_offset = log.append(&blocks[1]).unwrap();
        }
        // Flip a payload byte of the second frame.
        {
            let mut bytes = std::fs::read(&path).unwrap();
            let target = second_offset as usize + FRAME_HEADER_BYTES as usize;
            bytes[target] ^= 0xff;
            std::fs::write(&path, &bytes).unwrap();
        }
        let log = BlockLog::open(&path).unwrap();
        // Only the first block survives; the bad tail is dropped.
        assert_eq!(log.last_block_num(), 1);
        assert_eq!(log.head().unwrap().id(), blocks[0].id());
    }
}
