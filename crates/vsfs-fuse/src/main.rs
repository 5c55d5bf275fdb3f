//! `mount.vsfs` — mounts a vsfs disk image at a host directory via FUSE.
//!
//! Owns the external collaborators §1 and §6 assign to the mount adapter:
//! argv parsing, the mmap of the image file, and the `fuser` session itself.
//! Everything past that point is `vsfs_core::ops` dispatch in `adapter`.

mod adapter;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::error;
use memmap2::MmapMut;

use vsfs_core::MountContext;

use adapter::VsfsFilesystem;

#[derive(Parser, Debug)]
#[command(name = "mount.vsfs", about = "Mount a vsfs disk image via FUSE")]
struct Cli {
    /// Path to the disk image file.
    image: PathBuf,

    /// Directory to mount the file system at.
    mountpoint: PathBuf,

    /// Automatically unmount when this process exits.
    #[arg(long = "auto-unmount")]
    auto_unmount: bool,

    /// Allow other users to access the mount.
    #[arg(long = "allow-other")]
    allow_other: bool,
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let file = OpenOptions::new().read(true).write(true).open(&cli.image)?;
    let mut mmap = unsafe { MmapMut::map_mut(&file)? };

    let ctx = MountContext::mount(&mut mmap)?;
    let fs = VsfsFilesystem::new(ctx);

    let mut options = vec![fuser::MountOption::FSName("vsfs".to_string())];
    if cli.auto_unmount {
        options.push(fuser::MountOption::AutoUnmount);
    }
    if cli.allow_other {
        options.push(fuser::MountOption::AllowOther);
    }

    log::info!("mounting {} at {}", cli.image.display(), cli.mountpoint.display());
    fuser::mount2(fs, &cli.mountpoint, &options)?;
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("mount.vsfs: {e}");
            ExitCode::FAILURE
        }
    }
}
