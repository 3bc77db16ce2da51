//! The `Requirements` collaborator: compares a device's reported identifiers
//! against a `check-requirements` manifest.

use crate::connection::FastbootSession;
use crate::error::{Error, Result};

/// Checks a manifest against a live device. The manifest format follows the
/// `android-info.txt` convention used by Android factory images: a
/// `require key=value1|value2|...` line is satisfied if `getvar key` returns
/// one of the listed values. Blank lines and `#` comments are ignored; any
/// other line is ignored rather than rejected, since a requirements manifest
/// may legitimately carry metadata the flash driver doesn't need to act on.
pub trait Requirements {
    fn check(&self, manifest: &str, session: &mut dyn FastbootSession) -> Result<()>;
}

/// The default [`Requirements`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestRequirements;

impl Requirements for ManifestRequirements {
    fn check(&self, manifest: &str, session: &mut dyn FastbootSession) -> Result<()> {
        for line in manifest.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some(rest) = line.strip_prefix("require ") else {
                continue;
            };
            let Some((key, allowed)) = rest.split_once('=') else {
                continue;
            };

            let actual = session.get_var(key)?;
            let satisfied = match &actual {
                Some(value) => allowed.split('|').any(|candidate| candidate == value),
                None => false,
            };

            if !satisfied {
                return Err(Error::RequirementsFailed {
                    detail: format!(
                        "{key}: device reports {actual:?}, manifest requires one of [{allowed}]"
                    ),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::fake::FakeSession;

    #[test]
    fn matching_requirement_passes() {
        let mut session = FakeSession::default().with_var("product", "raven");
        let manifest = "require product=raven|cheetah\n";
        assert!(ManifestRequirements.check(manifest, &mut session).is_ok());
    }

    #[test]
    fn mismatched_requirement_fails() {
        let mut session = FakeSession::default().with_var("product", "tokay");
        let manifest = "require product=raven|cheetah\n";
        assert!(matches!(
            ManifestRequirements.check(manifest, &mut session),
            Err(Error::RequirementsFailed { .. })
        ));
    }

    #[test]
    fn unsupported_variable_fails() {
        let mut session = FakeSession::default();
        let manifest = "require product=raven\n";
        assert!(matches!(
            ManifestRequirements.check(manifest, &mut session),
            Err(Error::RequirementsFailed { .. })
        ));
    }

    #[test]
    fn comments_and_unrelated_lines_are_ignored() {
        let mut session = FakeSession::default().with_var("product", "raven");
        let manifest = "# header\nbuild-date=2024-01-01\nrequire product=raven\n";
        assert!(ManifestRequirements.check(manifest, &mut session).is_ok());
    }
}
