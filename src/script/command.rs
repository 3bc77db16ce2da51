//! The typed command set a parsed script reduces to.

/// Which A/B slot a `flash` line targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PartitionSlot {
    /// Whatever slot is currently active.
    Current,
    /// The slot that is not currently active.
    Other,
}

/// A single instruction out of `script.txt`, already resolved against the
/// archive's entry-name prefix.
///
/// A tagged variant rather than a trait object: the executor's match over
/// `Command` is exhaustive and compiler-checked, so there is no default
/// "unknown command" branch to maintain at execution time — that concern is
/// fully handled once, at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read `file_ref` as a requirements manifest and check it against the
    /// device.
    CheckRequirements { file_ref: String },
    /// Assert that `getvar name` returns exactly `expected`.
    CheckVar { name: String, expected: String },
    /// Erase `partition`, subject to the executor's wipe policy.
    Erase { partition: String },
    /// Flash `file_ref`'s contents to `partition` on the given slot.
    Flash {
        partition: String,
        file_ref: String,
        slot: PartitionSlot,
    },
    /// Cancel an in-progress snapshot update, if the device reports one.
    MaybeCancelSnapshotUpdate,
    /// Reboot into the bootloader and reconnect.
    RebootBootloader,
    /// Pass `raw` straight through to the fastboot session, verbatim.
    RunCmd { raw: String },
    /// Swap the active A/B slot.
    ToggleActiveSlot,
}
