//! Page Builder (C1): formats an in-memory heap page — init, item
//! insertion with alignment, free-space accounting.

use log::debug;

use crate::error::{DlError, DlResult};
use crate::relation::OffsetNumber;

use super::header::{maxalign, PageHeader, SIZE_OF_PAGE_HEADER};

/// Size, in bytes, of one line-pointer entry.
pub const SIZE_OF_ITEM_ID: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemId {
    pub offset: u16,
    pub length: u16,
}

/// One in-memory page buffer. Owns its bytes; the header lives at
/// offset 0, the line-pointer array grows up from `lower`, tuple bytes
/// grow down from `upper`.
#[derive(Debug, Clone)]
pub struct Page {
    pub page_size: usize,
    bytes: Vec<u8>,
}

impl Page {
    /// `page_init`: zero the buffer, set `lower = SizeOfPageHeaderData`,
    /// `upper = page_size - aligned(special_size)`, `special = upper`.
    pub fn init(page_size: usize, special_size: usize) -> Self {
        let mut bytes = vec![0u8; page_size];
        let special = page_size - maxalign(special_size);
        let hdr = PageHeader {
            lsn: 0,
            checksum: 0,
            flags: 0,
            lower: SIZE_OF_PAGE_HEADER as u16,
            upper: special as u16,
            special: special as u16,
            page_size_and_version: PageHeader::encode_page_size_and_version(page_size),
        };
        hdr.write_to(&mut bytes);
        Self { page_size, bytes }
    }

    pub fn header(&self) -> PageHeader {
        PageHeader::read_from(&self.bytes)
    }

    fn write_header(&mut self, hdr: &PageHeader) {
        hdr.write_to(&mut self.bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn set_lsn(&mut self, lsn: u64) {
        let mut hdr = self.header();
        hdr.lsn = lsn;
        self.write_header(&hdr);
    }

    /// `flush()` step c: zeros the checksum field, computes it over the
    /// page with its future block number, and writes it back. Must run
    /// after the page is done accepting inserts and its block number
    /// is known, and before its bytes reach the segment file.
    pub fn finalize_checksum(&mut self, blockno: crate::relation::BlockNumber, checksum_fn: &dyn crate::checksum::PageChecksum) {
        let mut hdr = self.header();
        hdr.checksum = 0;
        self.write_header(&hdr);
        hdr.checksum = checksum_fn.compute(&self.bytes, blockno);
        self.write_header(&hdr);
    }

    /// `page_free_space`: `upper - lower - sizeof(line-pointer)` if
    /// positive, else zero.
    pub fn free_space(&self) -> usize {
        let hdr = self.header();
        let used_for_item_id = hdr.upper as i64 - hdr.lower as i64 - SIZE_OF_ITEM_ID as i64;
        if used_for_item_id > 0 {
            used_for_item_id as usize
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        let hdr = self.header();
        hdr.lower as usize == SIZE_OF_PAGE_HEADER
    }

    fn item_count(&self) -> usize {
        let hdr = self.header();
        (hdr.lower as usize - SIZE_OF_PAGE_HEADER) / SIZE_OF_ITEM_ID
    }

    /// `page_add_item`: appends a line pointer at `lower`, copies the
    /// item ending at `upper`, returns its 1-based offset number. Fails
    /// when space is insufficient. Tuples are placed in arrival order;
    /// no offset is ever reused.
    pub fn add_item(&mut self, item: &[u8]) -> DlResult<OffsetNumber> {
        let aligned_len = maxalign(item.len());
        if aligned_len > self.free_space() {
            return Err(DlError::fatal(format!(
                "insufficient space on page: need {}, have {}",
                aligned_len,
                self.free_space()
            )));
        }

        let mut hdr = self.header();
        let new_upper = hdr.upper as usize - aligned_len;
        self.bytes[new_upper..new_upper + item.len()].copy_from_slice(item);

        let item_id = ItemId {
            offset: new_upper as u16,
            length: item.len() as u16,
        };
        let slot = hdr.lower as usize;
        self.bytes[slot..slot + 2].copy_from_slice(&item_id.offset.to_le_bytes());
        self.bytes[slot + 2..slot + 4].copy_from_slice(&item_id.length.to_le_bytes());

        hdr.lower += SIZE_OF_ITEM_ID as u16;
        hdr.upper = new_upper as u16;
        self.write_header(&hdr);

        let offnum = self.item_count() as OffsetNumber;
        debug!(
            "page_add_item: offnum={} len={} aligned={} free_space_after={}",
            offnum,
            item.len(),
            aligned_len,
            self.free_space()
        );
        Ok(offnum)
    }

    /// Overwrite the bytes of an already-placed item in place (used to
    /// write the computed `ctid` back into the tuple header after
    /// placement — the item's length never changes).
    pub fn overwrite_item(&mut self, offnum: OffsetNumber, item: &[u8]) {
        let item_id = self.item_id(offnum);
        let start = item_id.offset as usize;
        self.bytes[start..start + item.len()].copy_from_slice(item);
    }

    pub fn item_id(&self, offnum: OffsetNumber) -> ItemId {
        let slot = SIZE_OF_PAGE_HEADER + (offnum as usize - 1) * SIZE_OF_ITEM_ID;
        let offset = u16::from_le_bytes(self.bytes[slot..slot + 2].try_into().unwrap());
        let length = u16::from_le_bytes(self.bytes[slot + 2..slot + 4].try_into().unwrap());
        ItemId { offset, length }
    }

    pub fn item_bytes(&self, offnum: OffsetNumber) -> &[u8] {
        let id = self.item_id(offnum);
        &self.bytes[id.offset as usize..id.offset as usize + id.length as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::header::BLCKSZ;

    #[test]
    fn fresh_page_is_empty_and_has_full_free_space() {
        let page = Page::init(BLCKSZ, 0);
        assert!(page.is_empty());
        let hdr = page.header();
        assert_eq!(hdr.lower as usize, SIZE_OF_PAGE_HEADER);
        assert_eq!(hdr.upper as usize, BLCKSZ);
        assert_eq!(hdr.special as usize, BLCKSZ);
        assert!(hdr.check_invariants(BLCKSZ));
    }

    #[test]
    fn add_item_grows_lower_shrinks_upper() {
        let mut page = Page::init(BLCKSZ, 0);
        let before = page.free_space();
        let offnum = page.add_item(&[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(offnum, 1);
        assert!(page.free_space() < before);
        assert_eq!(page.item_bytes(1), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn offsets_are_never_reused_and_increase_in_arrival_order() {
        let mut page = Page::init(BLCKSZ, 0);
        let a = page.add_item(&[1]).unwrap();
        let b = page.add_item(&[2]).unwrap();
        let c = page.add_item(&[3]).unwrap();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn add_item_fails_when_page_is_full() {
        let mut page = Page::init(BLCKSZ, 0);
        let big = vec![0u8; BLCKSZ];
        assert!(page.add_item(&big).is_err());
    }

    #[test]
    fn special_area_is_reserved_and_max_aligned() {
        let page = Page::init(BLCKSZ, 13);
        let hdr = page.header();
        assert_eq!(maxalign(hdr.special as usize), hdr.special as usize);
        assert_eq!(hdr.special as usize, BLCKSZ - maxalign(13));
        assert!(hdr.special as usize <= BLCKSZ);
    }
}
