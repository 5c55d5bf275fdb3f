//! `mkfs.vsfs` — formats a disk image file into a fresh vsfs file system.
//!
//! Owns the two external collaborators §1 and §6 name for the formatter:
//! argv parsing and the mmap of the image file. The actual format logic
//! lives in `vsfs_core::format`, which takes nothing but a byte slice and an
//! options struct.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;
use memmap2::MmapMut;

use vsfs_core::{format_image, FormatOptions};

#[derive(Parser, Debug)]
#[command(name = "mkfs.vsfs", about = "Format a disk image as a vsfs file system")]
struct Cli {
    /// Number of inodes to provision.
    #[arg(short = 'i', long = "inodes")]
    inodes: u32,

    /// Overwrite an image that already carries the vsfs magic number.
    #[arg(short = 'f', long = "force")]
    force: bool,

    /// Zero the entire image before formatting.
    #[arg(short = 'z', long = "zero")]
    zero: bool,

    /// Path to the disk image file.
    image: PathBuf,
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let file = OpenOptions::new().read(true).write(true).open(&cli.image)?;
    let mut mmap = unsafe { MmapMut::map_mut(&file)? };

    format_image(
        &mut mmap,
        FormatOptions {
            num_inodes: cli.inodes,
            force: cli.force,
            zero: cli.zero,
        },
    )?;

    mmap.flush()?;
    log::info!("formatted {} with {} inodes", cli.image.display(), cli.inodes);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("mkfs.vsfs: {e}");
            ExitCode::FAILURE
        }
    }
}
