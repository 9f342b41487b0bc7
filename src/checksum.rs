//! Page-checksum collaborator (spec.md §4.4 step c, §6): whether
//! checksums are enabled, and the algorithm itself, are a cluster-wide
//! concern owned by the host database — this crate only calls through
//! the trait once a page's future block number is known, right before
//! it leaves the ring for its segment file.

use crate::relation::BlockNumber;

pub trait PageChecksum {
    /// Computes the checksum for `bytes` (the full page buffer, with
    /// the checksum field itself still zero).
    fn compute(&self, bytes: &[u8], blockno: BlockNumber) -> u16;
}

/// Cluster checksums disabled (the default for an uninitialized
/// cluster, and for most of this crate's tests).
pub struct NoChecksum;

impl PageChecksum for NoChecksum {
    fn compute(&self, _bytes: &[u8], _blockno: BlockNumber) -> u16 {
        0
    }
}

/// Cluster checksums enabled. CRC-32C seeded with the block number
/// (so a page copied to the wrong offset won't validate by accident),
/// folded to 16 bits. `0` is reserved to mean "no checksum", so the
/// rare fold that lands on it is nudged to `1`.
pub struct Crc32cChecksum;

impl PageChecksum for Crc32cChecksum {
    fn compute(&self, bytes: &[u8], blockno: BlockNumber) -> u16 {
        let sum = crc32c::crc32c_append(blockno, bytes);
        let folded = ((sum >> 16) ^ (sum & 0xFFFF)) as u16;
        if folded == 0 {
            1
        } else {
            folded
        }
    }
}
