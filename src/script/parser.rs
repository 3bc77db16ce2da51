//! Tokenizing `script.txt` into [`Command`]s.

use std::io::Read;

use crate::archive::{EntryMeta, StreamingEntryReader, ZipArchive};
use crate::error::{Error, Result};

use super::command::{Command, PartitionSlot};

const SCRIPT_SUFFIX: &str = "/script.txt";

/// Locate the archive's `script.txt`, parse it, and resolve every file
/// reference against the entry-name prefix (the directory `script.txt`
/// itself lives in).
pub fn parse_script(archive: &dyn ZipArchive) -> Result<Vec<Command>> {
    let script_meta = locate_script(archive)?;
    let prefix = &script_meta.filename[..script_meta.filename.len() - "script.txt".len()];

    let mut reader = StreamingEntryReader::new(archive, script_meta)?;
    let mut raw = Vec::new();
    reader.read_to_end(&mut raw)?;
    let text = String::from_utf8(raw).map_err(|_| Error::InvalidUtf8(script_meta.filename.clone()))?;

    let mut commands = Vec::new();
    for (index, raw_line) in text.split('\n').enumerate() {
        let line_no = index + 1;
        let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.contains('\t') {
            return Err(Error::MalformedLine { line: line_no });
        }

        commands.push(parse_line(line, line_no, prefix)?);
    }

    Ok(commands)
}

fn locate_script(archive: &dyn ZipArchive) -> Result<&EntryMeta> {
    archive
        .entries()
        .iter()
        .find(|entry| entry.filename.ends_with(SCRIPT_SUFFIX))
        .ok_or(Error::ScriptMissing)
}

fn parse_line(line: &str, line_no: usize, prefix: &str) -> Result<Command> {
    let mut head = line.splitn(2, ' ');
    let keyword = head.next().unwrap_or_default();
    let rest = head.next();

    if keyword == "run-cmd" {
        return Ok(Command::RunCmd {
            raw: rest.unwrap_or_default().to_string(),
        });
    }

    let tokens: Vec<&str> = line.split(' ').collect();

    let malformed = || Error::MalformedLine { line: line_no };

    match keyword {
        "check-requirements" => {
            if tokens.len() != 2 {
                return Err(malformed());
            }
            Ok(Command::CheckRequirements {
                file_ref: format!("{prefix}{}", tokens[1]),
            })
        }
        "check-var" => {
            if tokens.len() != 3 {
                return Err(malformed());
            }
            Ok(Command::CheckVar {
                name: tokens[1].to_string(),
                expected: tokens[2].to_string(),
            })
        }
        "erase" => {
            if tokens.len() != 2 {
                return Err(malformed());
            }
            Ok(Command::Erase {
                partition: tokens[1].to_string(),
            })
        }
        "flash" => {
            if tokens.len() != 3 && tokens.len() != 4 {
                return Err(malformed());
            }
            let slot = match tokens.get(3) {
                None => PartitionSlot::Current,
                Some(&"other-slot") => PartitionSlot::Other,
                Some(_) => return Err(malformed()),
            };
            Ok(Command::Flash {
                partition: tokens[1].to_string(),
                file_ref: format!("{prefix}{}", tokens[2]),
                slot,
            })
        }
        "maybe-cancel-snapshot-update" => {
            if tokens.len() != 1 {
                return Err(malformed());
            }
            Ok(Command::MaybeCancelSnapshotUpdate)
        }
        "reboot-bootloader" => {
            if tokens.len() != 1 {
                return Err(malformed());
            }
            Ok(Command::RebootBootloader)
        }
        "toggle-active-slot" => {
            if tokens.len() != 1 {
                return Err(malformed());
            }
            Ok(Command::ToggleActiveSlot)
        }
        _ => Err(Error::UnknownCommand { line: line_no }),
    }
}
