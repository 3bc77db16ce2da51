//! The fastboot transport boundary the executor drives.
//!
//! USB enumeration, wire framing, and command encoding are deliberately kept
//! out of the tested core: the executor only ever talks to the
//! [`FastbootSession`] trait. [`usb`] supplies the concrete, ambient
//! implementation used by the reference CLI.

pub mod usb;

#[cfg(test)]
pub(crate) mod fake;

use std::io::Read;

use crate::error::Result;

/// Wire-level A/B slot identifier: fastboot always sees the literal letters
/// `a` or `b`, never "current" or "other" — that resolution happens one
/// layer up, in [`crate::executor::FlashExecutor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::A => "a",
            Slot::B => "b",
        }
    }

    /// The complementary slot, per the `a`\<-\>`b` mapping.
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Parse a `current-slot` getvar response; anything other than `"a"` or
    /// `"b"` is not a valid slot.
    pub fn parse(value: &str) -> Option<Slot> {
        match value {
            "a" => Some(Slot::A),
            "b" => Some(Slot::B),
            _ => None,
        }
    }
}

/// The fastboot session contract the flash driver consumes.
///
/// Implementors own the wire protocol entirely: framing, retries, and
/// whatever chunking the transport needs beyond what
/// [`crate::chunked_writer::ChunkedWriter`] already provides at the
/// `flash` boundary.
pub trait FastbootSession {
    /// `getvar name`. `None` means the device does not report this
    /// variable, which is not itself an error.
    fn get_var(&mut self, name: &str) -> Result<Option<String>>;

    /// Pass an opaque fastboot command straight to the device.
    fn run(&mut self, raw: &str) -> Result<()>;

    /// Download `stream_len` bytes from `stream` and flash them to
    /// `partition` on `slot`, invoking `progress` with a fraction in
    /// `[0.0, 1.0]` as the transfer proceeds.
    fn flash(
        &mut self,
        partition: &str,
        slot: Slot,
        stream: &mut dyn Read,
        stream_len: u64,
        progress: &mut dyn FnMut(f32),
    ) -> Result<()>;

    /// Erase `partition`. The default forwards to [`Self::run`], matching
    /// how most fastboot implementations expose it as `erase:{partition}`
    /// rather than a distinct wire command.
    fn erase(&mut self, partition: &str) -> Result<()> {
        self.run(&format!("erase:{partition}"))
    }
}
