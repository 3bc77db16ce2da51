//! An in-memory [`FastbootSession`] double used by unit tests elsewhere in
//! the crate (the executor and requirements tests in particular).

use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Read;
use std::rc::Rc;

use super::{FastbootSession, Slot};
use crate::error::Result;

/// The call log a [`FakeSession`] writes into, kept outside the session
/// itself so tests can still inspect it after the session has been moved
/// into a `Box<dyn FastbootSession>` and handed to an executor.
#[derive(Default)]
pub(crate) struct Log {
    pub calls: Vec<String>,
    /// The full byte payload handed to each `flash()` call, in call order —
    /// lets tests assert a `Flash` command's bytes reassemble to exactly the
    /// original entry, not just that some call of the right length happened.
    pub flashed_payloads: Vec<Vec<u8>>,
}

#[derive(Clone)]
pub(crate) struct FakeSession {
    vars: HashMap<String, String>,
    log: Rc<RefCell<Log>>,
}

impl Default for FakeSession {
    fn default() -> Self {
        Self {
            vars: HashMap::new(),
            log: Rc::new(RefCell::new(Log::default())),
        }
    }
}

impl FakeSession {
    pub fn with_var(mut self, key: &str, value: &str) -> Self {
        self.vars.insert(key.to_string(), value.to_string());
        self
    }

    /// A handle onto this session's call log, independent of wherever the
    /// session itself ends up.
    pub fn log_handle(&self) -> Rc<RefCell<Log>> {
        self.log.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.borrow().calls.clone()
    }
}

impl FastbootSession for FakeSession {
    fn get_var(&mut self, name: &str) -> Result<Option<String>> {
        self.log.borrow_mut().calls.push(format!("getvar {name}"));
        Ok(self.vars.get(name).cloned())
    }

    fn run(&mut self, raw: &str) -> Result<()> {
        self.log.borrow_mut().calls.push(raw.to_string());
        Ok(())
    }

    fn flash(
        &mut self,
        partition: &str,
        slot: Slot,
        stream: &mut dyn Read,
        _stream_len: u64,
        progress: &mut dyn FnMut(f32),
    ) -> Result<()> {
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        {
            let mut log = self.log.borrow_mut();
            log.calls.push(format!(
                "flash {partition} {} ({} bytes)",
                slot.as_str(),
                buf.len()
            ));
            log.flashed_payloads.push(buf);
        }
        progress(0.5);
        progress(1.0);
        Ok(())
    }
}
