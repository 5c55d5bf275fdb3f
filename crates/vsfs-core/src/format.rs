//! The image formatter: writes a valid, empty vsfs file system into a
//! freshly sized image buffer.

use log::{debug, info, warn};

use crate::bitmap::Bitmap;
use crate::disk::{DirEntry, Inode, SuperBlock, S_IFDIR};
use crate::error::{VsfsError, VsfsResult};
use crate::layout::{
    self, BLK_MAX, BLK_MIN, BLOCK_SIZE, DBMAP_BLOCK, IBMAP_BLOCK, INO_MAX, ITABLE_START, ROOT_INO,
    SB_BLOCK,
};

/// Options controlling a format run, mirroring the formatter CLI's `-i`,
/// `-f`, and `-z` flags (§6). The core `format` function takes this struct
/// directly — it has no CLI dependency of its own.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Number of inodes to provision.
    pub num_inodes: u32,
    /// Overwrite an image that already carries `MAGIC`.
    pub force: bool,
    /// Zero the entire image before formatting.
    pub zero: bool,
}

fn now() -> (i64, i64) {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64, dur.subsec_nanos() as i64)
}

fn block_mut(image: &mut [u8], block_num: u32) -> &mut [u8] {
    let start = block_num as usize * BLOCK_SIZE;
    &mut image[start..start + BLOCK_SIZE]
}

/// Format `image` (an exclusively-held, writable byte buffer backing the
/// disk image) into a fresh, empty vsfs file system.
///
/// Only after every step below succeeds is the magic written, so a failure
/// partway through leaves the image without `MAGIC` and a subsequent mount
/// refuses to open it (§4.2).
pub fn format(image: &mut [u8], opts: FormatOptions) -> VsfsResult<()> {
    let size = image.len() as u64;
    if size == 0 || size % BLOCK_SIZE as u64 != 0 {
        warn!("image size {size} is not a positive multiple of BLOCK_SIZE");
        return Err(VsfsError::InvalidImage);
    }
    let num_blocks = (size / BLOCK_SIZE as u64) as u32;
    if !(BLK_MIN..=BLK_MAX).contains(&num_blocks) {
        warn!("image has {num_blocks} blocks, outside [{BLK_MIN}, {BLK_MAX}]");
        return Err(VsfsError::InvalidImage);
    }
    if opts.num_inodes >= INO_MAX {
        return Err(VsfsError::InvalidImage);
    }

    if !opts.force && SuperBlock::decode(&image[..BLOCK_SIZE]).magic == layout::MAGIC {
        warn!("refusing to format: image already carries MAGIC and force was not requested");
        return Err(VsfsError::FormatRefused);
    }

    if opts.zero {
        debug!("zeroing {size} bytes before formatting");
        image.fill(0);
    }

    let table_blocks = layout::inode_table_blocks(opts.num_inodes);
    let data_region = layout::data_region_start(opts.num_inodes);
    if data_region >= num_blocks {
        warn!("inode table leaves no room for a data region");
        return Err(VsfsError::NoSpace);
    }

    // 1. Inode bitmap: pin everything, then clear the live inode range.
    {
        let mut ibmap = Bitmap::new(block_mut(image, IBMAP_BLOCK));
        ibmap.init(opts.num_inodes);
    }

    // 2. Data bitmap: pin everything, clear the live block range, then
    //    mark every metadata block (superblock, both bitmaps, inode table)
    //    allocated.
    let root_data_block;
    {
        let mut dbmap = Bitmap::new(block_mut(image, DBMAP_BLOCK));
        dbmap.init(num_blocks);
        for b in 0..data_region {
            dbmap.set(b, true);
        }
        root_data_block = dbmap.alloc(num_blocks).ok_or(VsfsError::NoSpace)?;
    }

    // 3. Root inode: bit ROOT_INO in the inode bitmap, then the record
    //    itself.
    {
        let mut ibmap = Bitmap::new(block_mut(image, IBMAP_BLOCK));
        ibmap.set(ROOT_INO, true);
    }
    let (mtime_sec, mtime_nsec) = now();
    let mut root_inode = Inode::zeroed();
    root_inode.mode = S_IFDIR | 0o777;
    root_inode.nlink = 2;
    root_inode.size = BLOCK_SIZE as u64;
    root_inode.block_count = 1;
    root_inode.mtime_sec = mtime_sec;
    root_inode.mtime_nsec = mtime_nsec;
    root_inode.direct[0] = root_data_block;
    write_inode(image, ROOT_INO, &root_inode);

    // 4. Root directory block: `.` and `..`, both pointing at ROOT_INO; the
    //    rest of the block is unused slots.
    {
        let block = block_mut(image, root_data_block);
        let entries_per_block = BLOCK_SIZE / DirEntry::RECORD_SIZE;
        DirEntry::new(ROOT_INO, ".").encode_into(&mut block[0..DirEntry::RECORD_SIZE]);
        DirEntry::new(ROOT_INO, "..")
            .encode_into(&mut block[DirEntry::RECORD_SIZE..2 * DirEntry::RECORD_SIZE]);
        for i in 2..entries_per_block {
            let start = i * DirEntry::RECORD_SIZE;
            DirEntry::unused().encode_into(&mut block[start..start + DirEntry::RECORD_SIZE]);
        }
    }

    // 5. Superblock, written last.
    let sb = SuperBlock {
        magic: layout::MAGIC,
        size,
        num_inodes: opts.num_inodes,
        free_inodes: opts.num_inodes - 1,
        num_blocks,
        free_blocks: num_blocks - data_region - 1,
        data_region,
    };
    sb.encode_into(block_mut(image, SB_BLOCK));

    info!(
        "formatted image: {num_blocks} blocks, {} inodes, {table_blocks} inode-table block(s), data region starts at block {data_region}",
        opts.num_inodes
    );
    Ok(())
}

fn write_inode(image: &mut [u8], ino: u32, inode: &Inode) {
    let block_num = ITABLE_START + ino / layout::INODES_PER_BLOCK;
    let offset_in_block = (ino % layout::INODES_PER_BLOCK) as usize * Inode::RECORD_SIZE;
    let block = block_mut(image, block_num);
    inode.encode_into(&mut block[offset_in_block..offset_in_block + Inode::RECORD_SIZE]);
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mount::MountContext;

    fn image_of(blocks: u32) -> Vec<u8> {
        vec![0u8; blocks as usize * BLOCK_SIZE]
    }

    #[test]
    fn format_then_mount_reports_expected_superblock() {
        let mut image = image_of(256); // 1 MiB
        format(
            &mut image,
            FormatOptions {
                num_inodes: 32,
                force: false,
                zero: false,
            },
        )
        .unwrap();

        let ctx = MountContext::mount(&mut image).unwrap();
        let sb = ctx.superblock();
        assert_eq!(sb.num_blocks, 256);
        assert_eq!(sb.num_inodes, 32);
        assert_eq!(sb.free_inodes, 31);
        assert_eq!(sb.data_region, 4);
    }

    #[test]
    fn refuses_reformat_without_force() {
        let mut image = image_of(64);
        let opts = FormatOptions {
            num_inodes: 16,
            force: false,
            zero: false,
        };
        format(&mut image, opts).unwrap();
        let magic_before = image[0..8].to_vec();
        let err = format(&mut image, opts).unwrap_err();
        assert_eq!(err, VsfsError::FormatRefused);
        assert_eq!(&image[0..8], magic_before.as_slice());
    }

    #[test]
    fn force_allows_reformat() {
        let mut image = image_of(64);
        let mut opts = FormatOptions {
            num_inodes: 16,
            force: false,
            zero: false,
        };
        format(&mut image, opts).unwrap();
        opts.force = true;
        opts.num_inodes = 20;
        format(&mut image, opts).unwrap();
        let ctx = MountContext::mount(&mut image).unwrap();
        assert_eq!(ctx.superblock().num_inodes, 20);
    }

    #[test]
    fn rejects_image_size_not_multiple_of_block_size() {
        let mut image = vec![0u8; BLOCK_SIZE + 1];
        let err = format(
            &mut image,
            FormatOptions {
                num_inodes: 16,
                force: false,
                zero: false,
            },
        )
        .unwrap_err();
        assert_eq!(err, VsfsError::InvalidImage);
    }

    #[test]
    fn rejects_too_few_blocks() {
        let mut image = image_of(BLK_MIN - 1);
        let err = format(
            &mut image,
            FormatOptions {
                num_inodes: 4,
                force: false,
                zero: false,
            },
        )
        .unwrap_err();
        assert_eq!(err, VsfsError::InvalidImage);
    }

    #[test]
    fn root_directory_has_dot_and_dotdot() {
        let mut image = image_of(64);
        format(
            &mut image,
            FormatOptions {
                num_inodes: 16,
                force: false,
                zero: false,
            },
        )
        .unwrap();
        let ctx = MountContext::mount(&mut image).unwrap();
        let root = ctx.read_inode(ROOT_INO);
        assert!(root.is_dir());
        assert_eq!(root.nlink, 2);
        let block = ctx.data_block(root.direct[0]);
        let dot = DirEntry::decode(&block[0..DirEntry::RECORD_SIZE]);
        let dotdot = DirEntry::decode(&block[DirEntry::RECORD_SIZE..2 * DirEntry::RECORD_SIZE]);
        assert_eq!(dot.name_str(), ".");
        assert_eq!(dot.inode, ROOT_INO);
        assert_eq!(dotdot.name_str(), "..");
        assert_eq!(dotdot.inode, ROOT_INO);
    }
}
