//! A minimal on-disk B-tree file format: just enough structure (meta
//! page, one level of internal pages, a leaf chain) for the BT Reader
//! (C6) to walk an existing index and the Merge Builder (C7) to write a
//! freshly bulk-built one. Real multi-terabyte B-trees need more than
//! one internal level; this crate's scope is the load-time algorithm,
//! not a general-purpose index implementation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{DlError, DlResult};
use crate::relation::ItemPointer;

use super::scan_key::KeyValue;
use super::spool::SpooledEntry;

pub const BT_MAGIC: u32 = 0x5854_4233; // "3BTX"
pub const BT_VERSION: u16 = 1;
pub const BT_PAGE_SIZE: usize = 4096;

pub const NONE_BLOCK: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCategory {
    Internal,
    Leaf,
}

#[derive(Debug, Clone)]
pub struct MetaPage {
    pub root: Option<u32>,
    pub fast_root: Option<u32>,
    pub level: u32,
}

#[derive(Debug, Clone)]
pub struct InternalEntry {
    /// `None` for the left-most ("minus infinity") child, reached via
    /// `P_FIRSTDATAKEY`.
    pub key: Option<Vec<KeyValue>>,
    pub child: u32,
}

#[derive(Debug, Clone)]
pub struct InternalPage {
    pub half_dead: bool,
    /// Right sibling, followed when a half-dead page must be skipped.
    pub next: Option<u32>,
    pub entries: Vec<InternalEntry>,
}

#[derive(Debug, Clone)]
pub struct LeafEntry {
    pub dead: bool,
    pub entry: SpooledEntry,
}

#[derive(Debug, Clone)]
pub struct LeafPage {
    pub half_dead: bool,
    pub next: Option<u32>,
    pub entries: Vec<LeafEntry>,
}

fn encode_opt_block(b: Option<u32>) -> u32 {
    b.unwrap_or(NONE_BLOCK)
}

fn decode_opt_block(b: u32) -> Option<u32> {
    if b == NONE_BLOCK {
        None
    } else {
        Some(b)
    }
}

fn encode_key(buf: &mut Vec<u8>, key: &[KeyValue]) {
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    for v in key {
        match v {
            None => buf.push(0),
            Some(x) => {
                buf.push(1);
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
}

fn decode_key(buf: &[u8], pos: &mut usize) -> Vec<KeyValue> {
    let n = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let tag = buf[*pos];
        *pos += 1;
        if tag == 0 {
            out.push(None);
        } else {
            let v = i64::from_le_bytes(buf[*pos..*pos + 8].try_into().unwrap());
            *pos += 8;
            out.push(Some(v));
        }
    }
    out
}

impl MetaPage {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BT_PAGE_SIZE);
        buf.extend_from_slice(&BT_MAGIC.to_le_bytes());
        buf.extend_from_slice(&BT_VERSION.to_le_bytes());
        buf.extend_from_slice(&encode_opt_block(self.root).to_le_bytes());
        buf.extend_from_slice(&encode_opt_block(self.fast_root).to_le_bytes());
        buf.extend_from_slice(&self.level.to_le_bytes());
        buf.resize(BT_PAGE_SIZE, 0);
        buf
    }

    fn decode(buf: &[u8]) -> DlResult<Self> {
        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let version = u16::from_le_bytes(buf[4..6].try_into().unwrap());
        if magic != BT_MAGIC || version != BT_VERSION {
            return Err(DlError::corruption("bad meta page magic or version"));
        }
        let root = decode_opt_block(u32::from_le_bytes(buf[6..10].try_into().unwrap()));
        let fast_root = decode_opt_block(u32::from_le_bytes(buf[10..14].try_into().unwrap()));
        let level = u32::from_le_bytes(buf[14..18].try_into().unwrap());
        Ok(Self {
            root,
            fast_root,
            level,
        })
    }
}

impl InternalPage {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BT_PAGE_SIZE);
        buf.push(2); // internal tag
        buf.push(self.half_dead as u8);
        buf.extend_from_slice(&encode_opt_block(self.next).to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            buf.extend_from_slice(&e.child.to_le_bytes());
            match &e.key {
                None => buf.push(0),
                Some(k) => {
                    buf.push(1);
                    encode_key(&mut buf, k);
                }
            }
        }
        assert!(buf.len() <= BT_PAGE_SIZE, "internal page overflow");
        buf.resize(BT_PAGE_SIZE, 0);
        buf
    }

    fn decode(buf: &[u8]) -> DlResult<Self> {
        if buf[0] != 2 {
            return Err(DlError::corruption("not an internal page"));
        }
        let half_dead = buf[1] != 0;
        let next = decode_opt_block(u32::from_le_bytes(buf[2..6].try_into().unwrap()));
        let count = u32::from_le_bytes(buf[6..10].try_into().unwrap()) as usize;
        let mut pos = 10;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let child = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
            pos += 4;
            let tag = buf[pos];
            pos += 1;
            let key = if tag == 0 {
                None
            } else {
                Some(decode_key(buf, &mut pos))
            };
            entries.push(InternalEntry { key, child });
        }
        Ok(Self {
            half_dead,
            next,
            entries,
        })
    }
}

impl LeafPage {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(BT_PAGE_SIZE);
        buf.push(3); // leaf tag
        buf.push(self.half_dead as u8);
        buf.extend_from_slice(&encode_opt_block(self.next).to_le_bytes());
        buf.extend_from_slice(&(self.entries.len() as u32).to_le_bytes());
        for e in &self.entries {
            buf.push(e.dead as u8);
            encode_key(&mut buf, &e.entry.key);
            buf.extend_from_slice(&e.entry.heap_tid.block.to_le_bytes());
            buf.extend_from_slice(&e.entry.heap_tid.offset.to_le_bytes());
        }
        assert!(buf.len() <= BT_PAGE_SIZE, "leaf page overflow");
        buf.resize(BT_PAGE_SIZE, 0);
        buf
    }

    fn decode(buf: &[u8]) -> DlResult<Self> {
        if buf[0] != 3 {
            return Err(DlError::corruption("not a leaf page"));
        }
        let half_dead = buf[1] != 0;
        let next = decode_opt_block(u32::from_le_bytes(buf[2..6].try_into().unwrap()));
        let count = u32::from_le_bytes(buf[6..10].try_into().unwrap()) as usize;
        let mut pos = 10;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let dead = buf[pos] != 0;
            pos += 1;
            let key = decode_key(buf, &mut pos);
            let block = u32::from_le_bytes(buf[pos..pos + 4].try_into().unwrap());
            pos += 4;
            let offset = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap());
            pos += 2;
            entries.push(LeafEntry {
                dead,
                entry: SpooledEntry {
                    key,
                    heap_tid: ItemPointer::new(block, offset),
                },
            });
        }
        Ok(Self {
            half_dead,
            next,
            entries,
        })
    }
}

/// Direct (buffer-cache-bypassing) access to the pages of one B-tree
/// file, addressed by block number. Page 0 is always the meta page.
pub struct BTreeFile {
    file: File,
}

impl BTreeFile {
    pub fn create(path: &Path) -> DlResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        Ok(Self { file })
    }

    pub fn open_read_only(path: &Path) -> DlResult<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(Self { file })
    }

    fn seek_block(&mut self, block: u32) -> DlResult<()> {
        self.file
            .seek(SeekFrom::Start(block as u64 * BT_PAGE_SIZE as u64))?;
        Ok(())
    }

    pub fn read_meta(&mut self) -> DlResult<MetaPage> {
        self.seek_block(0)?;
        let mut buf = vec![0u8; BT_PAGE_SIZE];
        self.file.read_exact(&mut buf)?;
        MetaPage::decode(&buf)
    }

    pub fn write_meta(&mut self, meta: &MetaPage) -> DlResult<()> {
        self.seek_block(0)?;
        self.file.write_all(&meta.encode())?;
        Ok(())
    }

    pub fn read_internal(&mut self, block: u32) -> DlResult<InternalPage> {
        self.seek_block(block)?;
        let mut buf = vec![0u8; BT_PAGE_SIZE];
        self.file.read_exact(&mut buf)?;
        InternalPage::decode(&buf)
    }

    pub fn write_internal(&mut self, block: u32, page: &InternalPage) -> DlResult<()> {
        self.seek_block(block)?;
        self.file.write_all(&page.encode())?;
        Ok(())
    }

    pub fn read_leaf(&mut self, block: u32) -> DlResult<LeafPage> {
        self.seek_block(block)?;
        let mut buf = vec![0u8; BT_PAGE_SIZE];
        self.file.read_exact(&mut buf)?;
        LeafPage::decode(&buf)
    }

    pub fn write_leaf(&mut self, block: u32, page: &LeafPage) -> DlResult<()> {
        self.seek_block(block)?;
        self.file.write_all(&page.encode())?;
        Ok(())
    }

    pub fn page_category(&mut self, block: u32) -> DlResult<PageCategory> {
        self.seek_block(block)?;
        let mut tag = [0u8; 1];
        self.file.read_exact(&mut tag)?;
        match tag[0] {
            2 => Ok(PageCategory::Internal),
            3 => Ok(PageCategory::Leaf),
            _ => Err(DlError::corruption("unrecognized page tag")),
        }
    }

    pub fn sync(&mut self) -> DlResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
