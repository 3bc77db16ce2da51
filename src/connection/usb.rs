//! A [`FastbootSession`] backed by real USB bulk endpoints, via `rusb`.
//!
//! This is the USB analogue of the teacher's `connection::reset` glue: a
//! concrete collaborator the executor and its tests never touch directly,
//! kept behind the trait so the core stays transport-agnostic.

use std::io::Read;
use std::time::Duration;

use log::{debug, info, warn};
use rusb::{Context, Device, DeviceHandle, Direction, TransferType, UsbContext};

use super::{FastbootSession, Slot};
use crate::chunked_writer::ChunkedWriter;
use crate::error::{Error, Result};

/// The interface class triple every fastboot-mode device exposes, per the
/// Android bootloader USB interface descriptor convention.
const FASTBOOT_CLASS: u8 = 0xff;
const FASTBOOT_SUBCLASS: u8 = 0x42;
const FASTBOOT_PROTOCOL: u8 = 0x03;

const DEFAULT_WIRE_TIMEOUT: Duration = Duration::from_secs(30);
const USB_PACKET_SIZE: usize = 16 * 1024;
const MAX_RESPONSE_LEN: usize = 256;

/// A fastboot session held open over a specific USB bulk in/out endpoint
/// pair, following the `OKAY`/`INFO`/`FAIL`/`DATA` framing every fastboot
/// implementation speaks over its command endpoint.
pub struct UsbFastbootSession {
    handle: DeviceHandle<Context>,
    interface: u8,
    in_endpoint: u8,
    out_endpoint: u8,
    timeout: Duration,
}

enum Reply {
    Okay(String),
    Data(usize),
    Fail(String),
    Info(String),
}

impl Reply {
    fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::transport(ProtocolError(
                "fastboot response shorter than 4 bytes".to_string(),
            )));
        }
        let (kind, body) = buf.split_at(4);
        let text = String::from_utf8_lossy(body).into_owned();
        match kind {
            b"OKAY" => Ok(Reply::Okay(text)),
            b"INFO" => Ok(Reply::Info(text)),
            b"FAIL" => Ok(Reply::Fail(text)),
            b"DATA" => usize::from_str_radix(text.trim_end_matches('\0'), 16)
                .map(Reply::Data)
                .map_err(|_| Error::transport(ProtocolError(format!("malformed DATA size '{text}'")))),
            other => Err(Error::transport(ProtocolError(format!(
                "unrecognized response header {other:?}"
            )))),
        }
    }
}

#[derive(Debug)]
struct ProtocolError(String);

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ProtocolError {}

impl UsbFastbootSession {
    /// Per-exchange wire timeout used when the caller doesn't override it,
    /// e.g. via [`crate::cli::config::Config::default_timeout_secs`].
    pub const DEFAULT_TIMEOUT: Duration = DEFAULT_WIRE_TIMEOUT;

    /// Enumerate USB devices and open the first one exposing a fastboot
    /// interface, optionally restricted to a specific vendor/product id, with
    /// the default wire timeout.
    pub fn open_first(vid: Option<u16>, pid: Option<u16>) -> Result<Self> {
        Self::open_first_with_timeout(vid, pid, DEFAULT_WIRE_TIMEOUT)
    }

    /// As [`Self::open_first`], but with an explicit per-exchange wire
    /// timeout (overridable from [`crate::cli::config::Config`]).
    pub fn open_first_with_timeout(
        vid: Option<u16>,
        pid: Option<u16>,
        timeout: Duration,
    ) -> Result<Self> {
        let context = Context::new()?;
        for device in context.devices()?.iter() {
            if let Some(found) = Self::try_open(&device, vid, pid, timeout)? {
                return Ok(found);
            }
        }
        Err(Error::DeviceNotFound)
    }

    fn try_open(
        device: &Device<Context>,
        vid: Option<u16>,
        pid: Option<u16>,
        timeout: Duration,
    ) -> Result<Option<Self>> {
        let device_desc = device.device_descriptor()?;
        if vid.is_some_and(|v| v != device_desc.vendor_id())
            || pid.is_some_and(|p| p != device_desc.product_id())
        {
            return Ok(None);
        }

        for config_index in 0..device_desc.num_configurations() {
            let config_desc = match device.config_descriptor(config_index) {
                Ok(desc) => desc,
                Err(_) => continue,
            };

            for interface in config_desc.interfaces() {
                for descriptor in interface.descriptors() {
                    if descriptor.class_code() == FASTBOOT_CLASS
                        && descriptor.sub_class_code() == FASTBOOT_SUBCLASS
                        && descriptor.protocol_code() == FASTBOOT_PROTOCOL
                    {
                        let (in_ep, out_ep) = match find_bulk_endpoints(&descriptor) {
                            Some(pair) => pair,
                            None => continue,
                        };

                        let mut handle = device.open()?;
                        handle.claim_interface(descriptor.interface_number())?;
                        info!(
                            "opened fastboot device {:04x}:{:04x} on interface {}",
                            device_desc.vendor_id(),
                            device_desc.product_id(),
                            descriptor.interface_number()
                        );

                        return Ok(Some(Self {
                            handle,
                            interface: descriptor.interface_number(),
                            in_endpoint: in_ep,
                            out_endpoint: out_ep,
                            timeout,
                        }));
                    }
                }
            }
        }

        Ok(None)
    }

    fn send_raw(&mut self, command: &str) -> Result<()> {
        debug!("-> {command}");
        self.handle
            .write_bulk(self.out_endpoint, command.as_bytes(), self.timeout)?;
        Ok(())
    }

    /// Read responses until a terminal `OKAY`/`FAIL`, logging any `INFO`
    /// lines along the way. Returns the `OKAY` payload, or a transport error
    /// wrapping the device's `FAIL` message.
    fn read_until_terminal(&mut self) -> Result<String> {
        loop {
            let mut buf = [0u8; MAX_RESPONSE_LEN];
            let n = self
                .handle
                .read_bulk(self.in_endpoint, &mut buf, self.timeout)?;
            match Reply::parse(&buf[..n])? {
                Reply::Okay(payload) => return Ok(payload),
                Reply::Fail(message) => {
                    return Err(Error::transport(ProtocolError(format!(
                        "device reported failure: {message}"
                    ))))
                }
                Reply::Info(message) => {
                    info!("{message}");
                    continue;
                }
                Reply::Data(_) => {
                    return Err(Error::transport(ProtocolError(
                        "unexpected DATA response outside a download".to_string(),
                    )))
                }
            }
        }
    }

    /// Resolve `partition` against the device's A/B slot suffix convention:
    /// suffix with `_a`/`_b` only if the device reports the partition as
    /// slotted (`has-slot:{partition}` == `"yes"`).
    fn wire_partition_name(&mut self, partition: &str, slot: Slot) -> Result<String> {
        let has_slot = self.get_var(&format!("has-slot:{partition}"))?;
        if has_slot.as_deref() == Some("yes") {
            Ok(format!("{partition}_{}", slot.as_str()))
        } else {
            Ok(partition.to_string())
        }
    }
}

impl FastbootSession for UsbFastbootSession {
    fn get_var(&mut self, name: &str) -> Result<Option<String>> {
        self.send_raw(&format!("getvar:{name}"))?;
        match self.read_until_terminal() {
            Ok(value) => Ok(Some(value)),
            Err(_) => Ok(None),
        }
    }

    fn run(&mut self, raw: &str) -> Result<()> {
        self.send_raw(raw)?;
        self.read_until_terminal()?;
        Ok(())
    }

    fn flash(
        &mut self,
        partition: &str,
        slot: Slot,
        stream: &mut dyn Read,
        stream_len: u64,
        progress: &mut dyn FnMut(f32),
    ) -> Result<()> {
        self.send_raw(&format!("download:{stream_len:08x}"))?;
        match Reply::parse(&{
            let mut buf = [0u8; MAX_RESPONSE_LEN];
            let n = self
                .handle
                .read_bulk(self.in_endpoint, &mut buf, self.timeout)?;
            buf[..n].to_vec()
        })? {
            Reply::Data(size) if size as u64 == stream_len => {}
            Reply::Data(size) => {
                return Err(Error::transport(ProtocolError(format!(
                    "device acknowledged download of {size} bytes, expected {stream_len}"
                ))))
            }
            Reply::Fail(message) => {
                return Err(Error::transport(ProtocolError(format!(
                    "device declined download: {message}"
                ))))
            }
            _ => {
                return Err(Error::transport(ProtocolError(
                    "unexpected response to download request".to_string(),
                )))
            }
        }

        // A single logical `download` is staged onto the wire as fixed-size
        // bulk writes via `ChunkedWriter`, so the partition image never has
        // to be buffered whole in host memory — only one `download`+`flash`
        // round trip happens per call, matching the device's own semantics
        // that a `flash:` command overwrites the partition from its start.
        let out_endpoint = self.out_endpoint;
        let timeout = self.timeout;
        let handle = &mut self.handle;
        let mut sent = 0u64;
        let mut writer = ChunkedWriter::new(
            USB_PACKET_SIZE,
            |chunk: &[u8]| {
                handle.write_bulk(out_endpoint, chunk, timeout)?;
                sent += chunk.len() as u64;
                if stream_len > 0 {
                    progress(sent as f32 / stream_len as f32);
                }
                Ok(())
            },
            stream_len,
        );
        writer.init(stream_len)?;
        let mut buf = [0u8; USB_PACKET_SIZE];
        loop {
            let n = stream.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write(&buf[..n])?;
        }
        writer.finish()?;

        self.read_until_terminal()?;

        let wire_name = self.wire_partition_name(partition, slot)?;
        self.send_raw(&format!("flash:{wire_name}"))?;
        self.read_until_terminal()?;

        Ok(())
    }

    fn erase(&mut self, partition: &str) -> Result<()> {
        self.send_raw(&format!("erase:{partition}"))?;
        self.read_until_terminal()?;
        Ok(())
    }
}

impl Drop for UsbFastbootSession {
    fn drop(&mut self) {
        if let Err(err) = self.handle.release_interface(self.interface) {
            warn!("failed to release fastboot USB interface: {err}");
        }
    }
}

fn find_bulk_endpoints(descriptor: &rusb::InterfaceDescriptor) -> Option<(u8, u8)> {
    let mut in_endpoint = None;
    let mut out_endpoint = None;

    for endpoint in descriptor.endpoint_descriptors() {
        if endpoint.transfer_type() != TransferType::Bulk {
            continue;
        }
        match endpoint.direction() {
            Direction::In => in_endpoint = Some(endpoint.address()),
            Direction::Out => out_endpoint = Some(endpoint.address()),
        }
    }

    match (in_endpoint, out_endpoint) {
        (Some(i), Some(o)) => Some((i, o)),
        _ => None,
    }
}
