//! [`FlashExecutor`]: interprets a [`FlashPlan`] against a live
//! [`FastbootSession`].

use std::io::Read;

use log::{debug, info};

use crate::archive::{StreamingEntryReader, ZipArchive};
use crate::connection::{FastbootSession, Slot};
use crate::error::{Error, Result};
use crate::plan::FlashPlan;
use crate::requirements::Requirements;
use crate::script::{Command, PartitionSlot};

/// Invoked after a bootloader reboot; must hand back a usable session,
/// possibly the same handle, possibly a freshly enumerated one. The
/// executor never assumes a session survives a reboot — it only ever holds
/// whatever this callback last returned.
pub type ReconnectCallback<'a> = dyn FnMut() -> Result<Box<dyn FastbootSession>> + 'a;

/// `progress(action, item, overall)`; `action` is one of `"wipe"`,
/// `"flash"`, `"reboot"`, `item` a partition name, file reference, or
/// `"device"`, and `overall` a fraction in `[0.0, 1.0]`.
pub type ProgressCallback<'a> = dyn FnMut(&str, &str, f32) + 'a;

/// Walks a [`FlashPlan`]'s commands in order against a live
/// [`FastbootSession`], single-threaded and cooperative: each command fully
/// completes, or fails, before the next begins.
pub struct FlashExecutor<'a> {
    archive: &'a dyn ZipArchive,
    requirements: &'a dyn Requirements,
    wipe: bool,
}

impl<'a> FlashExecutor<'a> {
    /// `wipe` governs every `Erase` command except `avb_custom_key`, which
    /// is always erased regardless (the device refuses to flash a
    /// replacement key over an existing one).
    pub fn new(archive: &'a dyn ZipArchive, requirements: &'a dyn Requirements, wipe: bool) -> Self {
        Self {
            archive,
            requirements,
            wipe,
        }
    }

    /// Run `plan` to completion against `session`, returning whichever
    /// session handle the walk ended on (unchanged unless a
    /// `RebootBootloader` command ran).
    pub fn run(
        &self,
        plan: &FlashPlan,
        mut session: Box<dyn FastbootSession>,
        reconnect: &mut ReconnectCallback,
        progress: &mut ProgressCallback,
    ) -> Result<Box<dyn FastbootSession>> {
        let total = plan.total_flash_bytes();
        let mut flashed_bytes: u64 = 0;

        for command in plan.commands() {
            let overall = overall_fraction(flashed_bytes, total);

            match command {
                Command::CheckRequirements { file_ref } => {
                    debug!("checking requirements from {file_ref}");
                    let text = self.read_entry_as_utf8(file_ref)?;
                    self.requirements.check(&text, session.as_mut())?;
                }

                Command::CheckVar { name, expected } => {
                    let actual = session.get_var(name)?.unwrap_or_default();
                    if &actual != expected {
                        return Err(Error::VarMismatch {
                            name: name.clone(),
                            expected: expected.clone(),
                            actual,
                        });
                    }
                }

                Command::Erase { partition } => {
                    progress("wipe", partition, overall);
                    if self.wipe || partition == "avb_custom_key" {
                        info!("erasing {partition}");
                        session.erase(partition)?;
                    }
                }

                Command::Flash {
                    partition,
                    file_ref,
                    slot,
                } => {
                    let meta = self
                        .archive
                        .entry_by_name(file_ref)
                        .ok_or_else(|| Error::MissingEntry {
                            file_ref: file_ref.clone(),
                        })?;
                    let entry_len = meta.uncompressed_size;
                    let share = if total > 0 {
                        entry_len as f32 / total as f32
                    } else {
                        0.0
                    };

                    info!("flashing {partition} ({file_ref})...");
                    let resolved = self.resolve_slot(*slot, session.as_mut())?;
                    let mut reader = StreamingEntryReader::new(self.archive, meta)?;

                    // One `flash()` call per command: `flash` means "write this
                    // partition from the start," so issuing several calls for
                    // one image (chunked at, say, `max-download-size`) would
                    // have each call overwrite the last instead of extending
                    // it. Any chunking the wire needs below this boundary is
                    // the transport's own problem to solve internally.
                    session.flash(
                        partition,
                        resolved,
                        &mut reader,
                        entry_len,
                        &mut |frac| progress("flash", file_ref, overall + frac * share),
                    )?;

                    flashed_bytes += entry_len;
                    progress("flash", file_ref, overall_fraction(flashed_bytes, total));
                }

                Command::MaybeCancelSnapshotUpdate => {
                    if let Some(status) = session.get_var("snapshot-update-status")? {
                        if status != "none" {
                            session.run("snapshot-update:cancel")?;
                        }
                    }
                }

                Command::RebootBootloader => {
                    progress("reboot", "device", overall);
                    info!("rebooting into bootloader...");
                    session.run("reboot-bootloader")?;
                    session = reconnect()?;
                }

                Command::RunCmd { raw } => {
                    session.run(raw)?;
                }

                Command::ToggleActiveSlot => {
                    let current = self.current_slot(session.as_mut())?;
                    session.run(&format!("set_active:{}", current.other().as_str()))?;
                }
            }
        }

        Ok(session)
    }

    fn read_entry_as_utf8(&self, file_ref: &str) -> Result<String> {
        let meta = self
            .archive
            .entry_by_name(file_ref)
            .ok_or_else(|| Error::MissingEntry {
                file_ref: file_ref.to_string(),
            })?;
        let mut reader = StreamingEntryReader::new(self.archive, meta)?;
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|_| Error::InvalidUtf8(file_ref.to_string()))?;
        Ok(text)
    }

    fn current_slot(&self, session: &mut dyn FastbootSession) -> Result<Slot> {
        let value = session
            .get_var("current-slot")?
            .ok_or_else(|| Error::UnknownSlot {
                value: String::new(),
            })?;
        Slot::parse(&value).ok_or(Error::UnknownSlot { value })
    }

    fn resolve_slot(&self, slot: PartitionSlot, session: &mut dyn FastbootSession) -> Result<Slot> {
        let current = self.current_slot(session)?;
        Ok(match slot {
            PartitionSlot::Current => current,
            PartitionSlot::Other => current.other(),
        })
    }
}

fn overall_fraction(flashed_bytes: u64, total: u64) -> f32 {
    if total > 0 {
        flashed_bytes as f32 / total as f32
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::zip::ZipContainer;
    use crate::connection::fake::FakeSession;
    use crate::requirements::ManifestRequirements;

    fn plan_for(files: Vec<(&str, Vec<u8>)>) -> (ZipContainer, FlashPlan) {
        let files = files
            .into_iter()
            .map(|(name, data)| (name.to_string(), data))
            .collect();
        let archive = ZipContainer::build_stored(files);
        let plan = FlashPlan::build(&archive).unwrap();
        (archive, plan)
    }

    fn run(
        archive: &ZipContainer,
        plan: &FlashPlan,
        session: FakeSession,
        wipe: bool,
    ) -> (Result<Box<dyn FastbootSession>>, Vec<String>, Vec<f32>) {
        let log = session.log_handle();
        let mut progress_log = Vec::new();
        let requirements = ManifestRequirements;
        let executor = FlashExecutor::new(archive, &requirements, wipe);
        let mut reconnect = || -> Result<Box<dyn FastbootSession>> {
            Ok(Box::new(FakeSession::default()))
        };
        let mut progress = |action: &str, item: &str, overall: f32| {
            progress_log.push(overall);
            debug!("{action} {item} {overall}");
        };
        let result = executor.run(plan, Box::new(session), &mut reconnect, &mut progress);
        let calls = log.borrow().calls.clone();
        (result, calls, progress_log)
    }

    #[test]
    fn empty_script_runs_with_no_calls_and_no_progress() {
        let (archive, plan) = plan_for(vec![("boot/script.txt", b"".to_vec())]);
        let (result, calls, progress) = run(&archive, &plan, FakeSession::default(), false);
        assert!(result.is_ok());
        assert!(calls.is_empty());
        assert!(progress.is_empty());
    }

    #[test]
    fn comment_and_blank_lines_scenario() {
        let (archive, plan) = plan_for(vec![(
            "boot/script.txt",
            b"# header\ncheck-var product raven\n\nerase userdata\n".to_vec(),
        )]);
        let session = FakeSession::default().with_var("product", "raven");
        let (result, calls, progress) = run(&archive, &plan, session, true);
        assert!(result.is_ok());
        assert_eq!(calls, vec!["getvar product", "erase:userdata"]);
        assert_eq!(progress, vec![0.0]);
    }

    #[test]
    fn flash_with_other_slot_reaches_full_progress() {
        let (archive, plan) = plan_for(vec![
            ("boot/script.txt", b"flash boot boot.img other-slot\n".to_vec()),
            ("boot/boot.img", vec![7u8; 100]),
        ]);
        assert_eq!(plan.total_flash_bytes(), 100);

        let session = FakeSession::default().with_var("current-slot", "a");
        let (result, calls, progress) = run(&archive, &plan, session, false);
        assert!(result.is_ok());
        assert!(calls.iter().any(|c| c == "flash boot b (100 bytes)"));
        assert_eq!(*progress.last().unwrap(), 1.0);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn wipe_false_only_erases_avb_custom_key() {
        let (archive, plan) = plan_for(vec![(
            "boot/script.txt",
            b"erase userdata\nerase avb_custom_key\n".to_vec(),
        )]);
        let (result, calls, _) = run(&archive, &plan, FakeSession::default(), false);
        assert!(result.is_ok());
        assert_eq!(calls, vec!["erase:avb_custom_key"]);
    }

    #[test]
    fn snapshot_cancel_skipped_when_none() {
        let (archive, plan) = plan_for(vec![(
            "boot/script.txt",
            b"maybe-cancel-snapshot-update\n".to_vec(),
        )]);
        let session = FakeSession::default().with_var("snapshot-update-status", "none");
        let (result, calls, _) = run(&archive, &plan, session, false);
        assert!(result.is_ok());
        assert_eq!(calls, vec!["getvar snapshot-update-status"]);
    }

    #[test]
    fn snapshot_cancel_issued_when_merging() {
        let (archive, plan) = plan_for(vec![(
            "boot/script.txt",
            b"maybe-cancel-snapshot-update\n".to_vec(),
        )]);
        let session = FakeSession::default().with_var("snapshot-update-status", "merging");
        let (result, calls, _) = run(&archive, &plan, session, false);
        assert!(result.is_ok());
        assert_eq!(
            calls,
            vec!["getvar snapshot-update-status", "snapshot-update:cancel"]
        );
    }

    #[test]
    fn run_cmd_passes_through_verbatim() {
        let (archive, plan) = plan_for(vec![(
            "boot/script.txt",
            b"run-cmd oem unlock confirm\n".to_vec(),
        )]);
        let (result, calls, _) = run(&archive, &plan, FakeSession::default(), false);
        assert!(result.is_ok());
        assert_eq!(calls, vec!["oem unlock confirm"]);
    }

    #[test]
    fn toggle_active_slot_flips_a_to_b() {
        let (archive, plan) = plan_for(vec![("boot/script.txt", b"toggle-active-slot\n".to_vec())]);
        let session = FakeSession::default().with_var("current-slot", "a");
        let (result, calls, _) = run(&archive, &plan, session, false);
        assert!(result.is_ok());
        assert_eq!(calls, vec!["getvar current-slot", "set_active:b"]);
    }

    #[test]
    fn toggle_active_slot_rejects_unknown_value() {
        let (archive, plan) = plan_for(vec![("boot/script.txt", b"toggle-active-slot\n".to_vec())]);
        let session = FakeSession::default().with_var("current-slot", "c");
        let (result, _, _) = run(&archive, &plan, session, false);
        assert!(matches!(result, Err(Error::UnknownSlot { value }) if value == "c"));
    }

    #[test]
    fn check_var_mismatch_fails() {
        let (archive, plan) = plan_for(vec![(
            "boot/script.txt",
            b"check-var product raven\n".to_vec(),
        )]);
        let session = FakeSession::default().with_var("product", "tokay");
        let (result, _, _) = run(&archive, &plan, session, false);
        assert!(matches!(
            result,
            Err(Error::VarMismatch { name, expected, actual })
                if name == "product" && expected == "raven" && actual == "tokay"
        ));
    }

    #[test]
    fn check_requirements_delegates_to_requirements_collaborator() {
        let (archive, plan) = plan_for(vec![
            ("boot/script.txt", b"check-requirements android-info.txt\n".to_vec()),
            ("boot/android-info.txt", b"require product=raven\n".to_vec()),
        ]);
        let session = FakeSession::default().with_var("product", "tokay");
        let (result, _, _) = run(&archive, &plan, session, false);
        assert!(matches!(result, Err(Error::RequirementsFailed { .. })));
    }

    #[test]
    fn reboot_bootloader_rebinds_to_reconnected_session() {
        let (archive, plan) = plan_for(vec![(
            "boot/script.txt",
            b"reboot-bootloader\ncheck-var product raven\n".to_vec(),
        )]);
        let requirements = ManifestRequirements;
        let executor = FlashExecutor::new(&archive, &requirements, false);

        let mut reconnect_calls = 0;
        let mut reconnect = || -> Result<Box<dyn FastbootSession>> {
            reconnect_calls += 1;
            Ok(Box::new(FakeSession::default().with_var("product", "raven")))
        };
        let mut progress = |_: &str, _: &str, _: f32| {};

        let session = FakeSession::default();
        let result = executor.run(&plan, Box::new(session), &mut reconnect, &mut progress);
        assert!(result.is_ok());
        assert_eq!(reconnect_calls, 1);
    }

    #[test]
    fn flash_issues_exactly_one_session_call_with_the_full_image() {
        let image: Vec<u8> = (0u8..=255).cycle().take(4096).collect();
        let (archive, plan) = plan_for(vec![
            ("boot/script.txt", b"flash boot boot.img\n".to_vec()),
            ("boot/boot.img", image.clone()),
        ]);
        let session = FakeSession::default().with_var("current-slot", "a");
        let log = session.log_handle();
        let (result, calls, progress) = run(&archive, &plan, session, false);
        assert!(result.is_ok());

        // A `Flash` command must reach the session exactly once: a partition
        // flash overwrites from the start, so splitting one image across
        // several `flash()` calls would leave only the last call's bytes on
        // the device.
        let flash_calls: Vec<&String> = calls.iter().filter(|c| c.starts_with("flash ")).collect();
        assert_eq!(flash_calls.len(), 1);
        assert_eq!(flash_calls[0], "flash boot a (4096 bytes)");
        assert_eq!(*progress.last().unwrap(), 1.0);

        let flashed = log.borrow().flashed_payloads.clone();
        assert_eq!(flashed, vec![image]);
    }
}
