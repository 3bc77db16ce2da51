//! [`FlashPlan`]: a parsed command sequence plus the precomputed aggregate
//! flash size used to normalize progress.

use crate::archive::ZipArchive;
use crate::error::{Error, Result};
use crate::script::{parse_script, Command};

/// An immutable, fully resolved flashing plan: the ordered command list from
/// `script.txt`, plus `total_flash_bytes`, the sum of the uncompressed size
/// of every entry a `Flash` command targets.
///
/// Built once per archive and never mutated afterwards; a [`crate::executor::FlashExecutor`]
/// borrows it for the whole run.
#[derive(Debug, Clone)]
pub struct FlashPlan {
    commands: Vec<Command>,
    total_flash_bytes: u64,
}

impl FlashPlan {
    /// Parse `archive`'s script and resolve every `Flash` command's target
    /// entry, failing eagerly with [`Error::MissingEntry`] if one is absent
    /// (stricter than the parser itself, since `total_flash_bytes` would
    /// otherwise be undefined).
    pub fn build(archive: &dyn ZipArchive) -> Result<Self> {
        let commands = parse_script(archive)?;

        let mut total_flash_bytes = 0u64;
        for command in &commands {
            if let Command::Flash { file_ref, .. } = command {
                let entry = archive
                    .entry_by_name(file_ref)
                    .ok_or_else(|| Error::MissingEntry {
                        file_ref: file_ref.clone(),
                    })?;
                total_flash_bytes += entry.uncompressed_size;
            }
        }

        Ok(Self {
            commands,
            total_flash_bytes,
        })
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Sum of uncompressed bytes over every `Flash` command's target entry;
    /// the denominator for overall progress fractions. `0` if the plan
    /// contains no `Flash` commands.
    pub fn total_flash_bytes(&self) -> u64 {
        self.total_flash_bytes
    }
}
