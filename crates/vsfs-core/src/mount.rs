//! Mount-time image validation and the in-memory handle binding a mapped
//! image to derived region pointers. [`MountContext`] is the sole holder of
//! pointers into the image; the operations engine consults it for every
//! lookup and mutation.

use crate::bitmap::Bitmap;
use crate::disk::{Inode, SuperBlock};
use crate::error::{VsfsError, VsfsResult};
use crate::layout::{self, BLOCK_SIZE, DBMAP_BLOCK, IBMAP_BLOCK, ITABLE_START};

/// A mounted vsfs image. Borrows the backing byte buffer for the duration
/// of the mount; the engine (`crate::ops`) takes `&mut MountContext` for
/// every operation that can mutate state.
///
/// The context never performs the mmap itself (§1 treats that as an
/// external collaborator) — callers hand it whatever `&mut [u8]` backs the
/// image, whether a real `memmap2::MmapMut` or, in tests, a plain `Vec<u8>`.
pub struct MountContext<'a> {
    image: &'a mut [u8],
}

impl<'a> MountContext<'a> {
    /// Validate an existing image and build a mount context over it.
    ///
    /// Fails with [`VsfsError::InvalidImage`] when the superblock's magic
    /// is wrong or its recorded size disagrees with the mapped size.
    pub fn mount(image: &'a mut [u8]) -> VsfsResult<Self> {
        if image.len() < BLOCK_SIZE || image.len() % BLOCK_SIZE != 0 {
            return Err(VsfsError::InvalidImage);
        }
        let sb = SuperBlock::decode(&image[..BLOCK_SIZE]);
        if sb.magic != layout::MAGIC {
            return Err(VsfsError::InvalidImage);
        }
        if sb.size != image.len() as u64 {
            return Err(VsfsError::InvalidImage);
        }
        Ok(MountContext { image })
    }

    pub fn superblock(&self) -> SuperBlock {
        SuperBlock::decode(&self.image[..BLOCK_SIZE])
    }

    fn write_superblock(&mut self, sb: &SuperBlock) {
        sb.encode_into(&mut self.image[..BLOCK_SIZE]);
    }

    fn block_mut(&mut self, block_num: u32) -> &mut [u8] {
        let start = block_num as usize * BLOCK_SIZE;
        &mut self.image[start..start + BLOCK_SIZE]
    }

    fn block(&self, block_num: u32) -> &[u8] {
        let start = block_num as usize * BLOCK_SIZE;
        &self.image[start..start + BLOCK_SIZE]
    }

    pub fn inode_bitmap(&mut self) -> Bitmap<'_> {
        Bitmap::new(self.block_mut(IBMAP_BLOCK))
    }

    pub fn data_bitmap(&mut self) -> Bitmap<'_> {
        Bitmap::new(self.block_mut(DBMAP_BLOCK))
    }

    /// Read a full data block (which may hold directory entries, file
    /// bytes, or an indirect block's packed pointer array).
    pub fn data_block(&self, block_num: u32) -> &[u8] {
        self.block(block_num)
    }

    pub fn data_block_mut(&mut self, block_num: u32) -> &mut [u8] {
        self.block_mut(block_num)
    }

    pub fn zero_block(&mut self, block_num: u32) {
        self.block_mut(block_num).fill(0);
    }

    fn inode_location(ino: u32) -> (u32, usize) {
        let block_num = ITABLE_START + ino / layout::INODES_PER_BLOCK;
        let offset = (ino % layout::INODES_PER_BLOCK) as usize * Inode::RECORD_SIZE;
        (block_num, offset)
    }

    pub fn read_inode(&self, ino: u32) -> Inode {
        let (block_num, offset) = Self::inode_location(ino);
        let block = self.block(block_num);
        Inode::decode(&block[offset..offset + Inode::RECORD_SIZE])
    }

    pub fn write_inode(&mut self, ino: u32, inode: &Inode) {
        let (block_num, offset) = Self::inode_location(ino);
        let block = self.block_mut(block_num);
        inode.encode_into(&mut block[offset..offset + Inode::RECORD_SIZE]);
    }

    /// Allocate an inode bit, or fail with [`VsfsError::NoSpace`].
    pub fn alloc_inode(&mut self) -> VsfsResult<u32> {
        let n = self.superblock().num_inodes;
        let ino = self.inode_bitmap().alloc(n).ok_or(VsfsError::NoSpace)?;
        self.adjust_free_inodes(-1);
        Ok(ino)
    }

    pub fn free_inode(&mut self, ino: u32) {
        self.inode_bitmap().free(ino);
        self.adjust_free_inodes(1);
    }

    /// Allocate a data block, zero it (closing the undefined-contents hole
    /// called out in the spec's indirect-block design note), and fail with
    /// [`VsfsError::NoSpace`] if the bitmap is exhausted.
    pub fn alloc_block(&mut self) -> VsfsResult<u32> {
        let n = self.superblock().num_blocks;
        let b = self.data_bitmap().alloc(n).ok_or(VsfsError::NoSpace)?;
        self.zero_block(b);
        self.adjust_free_blocks(-1);
        Ok(b)
    }

    pub fn free_block(&mut self, b: u32) {
        self.data_bitmap().free(b);
        self.adjust_free_blocks(1);
    }

    fn adjust_free_inodes(&mut self, delta: i64) {
        let mut sb = self.superblock();
        sb.free_inodes = (sb.free_inodes as i64 + delta) as u32;
        self.write_superblock(&sb);
    }

    fn adjust_free_blocks(&mut self, delta: i64) {
        let mut sb = self.superblock();
        sb.free_blocks = (sb.free_blocks as i64 + delta) as u32;
        self.write_superblock(&sb);
    }

    /// Read the `idx`-th pointer stored in an indirect block.
    pub fn indirect_ptr(&self, indirect_block: u32, idx: usize) -> u32 {
        let block = self.data_block(indirect_block);
        let start = idx * 4;
        u32::from_le_bytes(block[start..start + 4].try_into().unwrap())
    }

    /// Write the `idx`-th pointer stored in an indirect block.
    pub fn set_indirect_ptr(&mut self, indirect_block: u32, idx: usize, value: u32) {
        let block = self.data_block_mut(indirect_block);
        let start = idx * 4;
        block[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }
}
