//! Byte-exact on-disk record definitions (§6 of the specification) and their
//! bincode codec. Each record is encoded/decoded into a fixed-size byte
//! window of the mapped image — the same `bincode::serde::encode_into_slice`
//! pattern the teacher's formatter uses for its superblock, generalized to
//! every on-disk record vsfs needs.

use serde::{Deserialize, Serialize};

use crate::layout::{BLOCK_SIZE, DIRENT_SIZE, INODE_RECORD_SIZE, NAME_MAX, NUM_DIRECT};

fn codec() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// File type bits, stored in the low bits of [`Inode::mode`] the way
/// `mode_t` packs `S_IFREG`/`S_IFDIR` on a POSIX host.
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
const S_IFMT: u32 = 0o170000;

/// Block 0: locates every other region and carries the free-space counters.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u64,
    pub size: u64,
    pub num_inodes: u32,
    pub free_inodes: u32,
    pub num_blocks: u32,
    pub free_blocks: u32,
    pub data_region: u32,
}

impl SuperBlock {
    /// Decode a superblock from the first block of the image.
    pub fn decode(block: &[u8]) -> Self {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        let (sb, _) = bincode::serde::decode_from_slice(block, codec()).expect(
            "decoding a fixed-layout superblock record cannot fail on a right-sized buffer",
        );
        sb
    }

    /// Encode this superblock into the first block of the image. The rest
    /// of the block is left as reserved padding.
    pub fn encode_into(&self, block: &mut [u8]) {
        debug_assert_eq!(block.len(), BLOCK_SIZE);
        bincode::serde::encode_into_slice(self, block, codec())
            .expect("superblock record fits in one block");
    }
}

/// One inode record: metadata plus direct/indirect block pointers.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inode {
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
    pub block_count: u32,
    pub mtime_sec: i64,
    pub mtime_nsec: i64,
    pub direct: [u32; NUM_DIRECT],
    pub indirect: u32,
}

impl Inode {
    pub const RECORD_SIZE: usize = INODE_RECORD_SIZE;

    /// The zero inode: unallocated, no blocks, epoch mtime.
    pub fn zeroed() -> Self {
        Inode {
            mode: 0,
            nlink: 0,
            size: 0,
            block_count: 0,
            mtime_sec: 0,
            mtime_nsec: 0,
            direct: [0; NUM_DIRECT],
            indirect: 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_reg(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Decode one inode record from a `RECORD_SIZE`-byte window.
    pub fn decode(record: &[u8]) -> Self {
        debug_assert_eq!(record.len(), Self::RECORD_SIZE);
        let (ino, _) = bincode::serde::decode_from_slice(record, codec())
            .expect("decoding a fixed-layout inode record cannot fail on a right-sized buffer");
        ino
    }

    /// Encode this inode into a `RECORD_SIZE`-byte window. The tail of the
    /// window beyond the encoded fields is reserved padding.
    pub fn encode_into(&self, record: &mut [u8]) {
        debug_assert_eq!(record.len(), Self::RECORD_SIZE);
        bincode::serde::encode_into_slice(self, record, codec())
            .expect("inode record fits in RECORD_SIZE bytes");
    }
}

/// One directory entry: an inode number plus a fixed-width name buffer. An
/// entry is "used" iff `inode != INO_MAX`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry {
    pub inode: u32,
    pub name: [u8; NAME_MAX + 1],
}

impl DirEntry {
    pub const RECORD_SIZE: usize = DIRENT_SIZE;

    pub fn new(inode: u32, name_str: &str) -> Self {
        let mut name = [0u8; NAME_MAX + 1];
        let bytes = name_str.as_bytes();
        let len = bytes.len().min(NAME_MAX);
        name[..len].copy_from_slice(&bytes[..len]);
        DirEntry { inode, name }
    }

    pub fn unused() -> Self {
        DirEntry {
            inode: crate::layout::INO_MAX,
            name: [0u8; NAME_MAX + 1],
        }
    }

    pub fn name_str(&self) -> &str {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        std::str::from_utf8(&self.name[..end]).unwrap_or("")
    }

    pub fn is_used(&self) -> bool {
        self.inode != crate::layout::INO_MAX
    }

    pub fn decode(record: &[u8]) -> Self {
        debug_assert_eq!(record.len(), Self::RECORD_SIZE);
        let (entry, _) = bincode::serde::decode_from_slice(record, codec())
            .expect("decoding a fixed-layout directory entry cannot fail on a right-sized buffer");
        entry
    }

    pub fn encode_into(&self, record: &mut [u8]) {
        debug_assert_eq!(record.len(), Self::RECORD_SIZE);
        bincode::serde::encode_into_slice(self, record, codec())
            .expect("directory entry fits in RECORD_SIZE bytes");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn superblock_round_trips() {
        let sb = SuperBlock {
            magic: crate::layout::MAGIC,
            size: 1 << 20,
            num_inodes: 32,
            free_inodes: 31,
            num_blocks: 256,
            free_blocks: 251,
            data_region: 4,
        };
        let mut block = [0u8; BLOCK_SIZE];
        sb.encode_into(&mut block);
        assert_eq!(SuperBlock::decode(&block), sb);
    }

    #[test]
    fn inode_round_trips() {
        let mut ino = Inode::zeroed();
        ino.mode = S_IFREG | 0o644;
        ino.nlink = 1;
        ino.size = 5000;
        ino.block_count = 2;
        ino.direct[0] = 10;
        ino.direct[1] = 11;
        let mut rec = [0u8; Inode::RECORD_SIZE];
        ino.encode_into(&mut rec);
        assert_eq!(Inode::decode(&rec), ino);
    }

    #[test]
    fn dirent_name_round_trips_and_truncates() {
        let e = DirEntry::new(7, "hello");
        let mut rec = [0u8; DirEntry::RECORD_SIZE];
        e.encode_into(&mut rec);
        let back = DirEntry::decode(&rec);
        assert_eq!(back.inode, 7);
        assert_eq!(back.name_str(), "hello");
        assert!(back.is_used());
    }

    #[test]
    fn unused_dirent_is_not_used() {
        assert!(!DirEntry::unused().is_used());
    }

    #[test]
    fn is_dir_is_reg_distinguish_mode_bits() {
        let mut d = Inode::zeroed();
        d.mode = S_IFDIR | 0o777;
        assert!(d.is_dir());
        assert!(!d.is_reg());

        let mut f = Inode::zeroed();
        f.mode = S_IFREG | 0o644;
        assert!(f.is_reg());
        assert!(!f.is_dir());
    }
}
