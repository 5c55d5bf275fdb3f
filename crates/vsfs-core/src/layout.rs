//! On-disk block layout constants and the arithmetic that derives region
//! boundaries from a superblock. Nothing here touches bytes directly; see
//! [`crate::disk`] for the byte-exact record definitions.

/// Size of a block, and therefore of every fixed-size region, in bytes.
pub const BLOCK_SIZE: usize = 4096;

/// Sentinel written to [`crate::disk::SuperBlock::magic`] by the formatter and
/// checked at mount time.
pub const MAGIC: u64 = 0x7673_6673_3146_5331; // "vsfs1FS1" read little-endian

/// Inode number of the (only) directory in the namespace.
pub const ROOT_INO: u32 = 0;

/// Sentinel inode number marking a directory-entry slot as unused. Must not
/// collide with any valid inode number, hence `num_inodes < INO_MAX` is an
/// invariant of a well-formed superblock.
pub const INO_MAX: u32 = u32::MAX;

/// Maximum file name length in bytes, excluding the NUL terminator. Chosen
/// so that `size_of::<DirEntry>()` (4-byte inode number + `NAME_MAX + 1`
/// bytes of name) is a power of two.
pub const NAME_MAX: usize = 27;

/// Maximum accepted length of an absolute path string.
pub const PATH_MAX: usize = 4096;

/// Number of direct block pointers stored inline in an inode.
pub const NUM_DIRECT: usize = 12;

/// Byte size of one on-disk inode record, chosen so that an integer number
/// of records fit in a block (`BLOCK_SIZE / INODE_RECORD_SIZE == 32`).
pub const INODE_RECORD_SIZE: usize = 128;

/// Byte size of one on-disk directory entry (4-byte inode number + name
/// buffer of `NAME_MAX + 1` bytes).
pub const DIRENT_SIZE: usize = 32;

/// Smallest legal image size, in blocks: enough for the superblock, both
/// bitmaps, a one-block inode table, and one data block for the root
/// directory.
pub const BLK_MIN: u32 = 16;

/// Largest legal image size, in blocks (~64 GiB of data region at 4 KiB
/// blocks).
pub const BLK_MAX: u32 = 0x00FF_FFFF;

/// Fixed block number of the superblock.
pub const SB_BLOCK: u32 = 0;
/// Fixed block number of the inode bitmap.
pub const IBMAP_BLOCK: u32 = 1;
/// Fixed block number of the data bitmap.
pub const DBMAP_BLOCK: u32 = 2;
/// Fixed block number where the inode table begins.
pub const ITABLE_START: u32 = 3;

/// Number of inode records that fit in one block.
pub const INODES_PER_BLOCK: u32 = (BLOCK_SIZE / INODE_RECORD_SIZE) as u32;

/// Number of 4-byte block pointers that fit in one indirect block.
pub const PTRS_PER_INDIRECT: usize = BLOCK_SIZE / 4;

/// Maximum number of blocks a single file may occupy: direct pointers plus
/// everything addressable through one indirect block.
pub const MAX_FILE_BLOCKS: usize = NUM_DIRECT + PTRS_PER_INDIRECT;

/// Number of blocks occupied by the inode table for a given inode count.
pub fn inode_table_blocks(num_inodes: u32) -> u32 {
    div_round_up(num_inodes, INODES_PER_BLOCK)
}

/// First block number of the data region for a given inode count.
pub fn data_region_start(num_inodes: u32) -> u32 {
    ITABLE_START + inode_table_blocks(num_inodes)
}

/// Integer ceiling of `x / y`.
pub fn div_round_up(x: u32, y: u32) -> u32 {
    (x + y - 1) / y
}

/// Number of blocks needed to hold `size` bytes.
pub fn blocks_for_size(size: u64) -> u32 {
    (((size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64) as u32)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inode_record_size_divides_block_size() {
        assert_eq!(BLOCK_SIZE % INODE_RECORD_SIZE, 0);
    }

    #[test]
    fn dirent_size_divides_block_size() {
        assert_eq!(BLOCK_SIZE % DIRENT_SIZE, 0);
    }

    #[test]
    fn num_inodes_below_ino_max() {
        assert!((INODES_PER_BLOCK as u64) * 1000 < INO_MAX as u64);
    }

    #[test]
    fn data_region_start_accounts_for_inode_table() {
        // 32 inodes fit in exactly one inode-table block.
        assert_eq!(inode_table_blocks(32), 1);
        assert_eq!(data_region_start(32), 4);
        // 33 inodes need a second block.
        assert_eq!(inode_table_blocks(33), 2);
        assert_eq!(data_region_start(33), 5);
    }

    #[test]
    fn blocks_for_size_rounds_up() {
        assert_eq!(blocks_for_size(0), 0);
        assert_eq!(blocks_for_size(1), 1);
        assert_eq!(blocks_for_size(BLOCK_SIZE as u64), 1);
        assert_eq!(blocks_for_size(BLOCK_SIZE as u64 + 1), 2);
    }
}
