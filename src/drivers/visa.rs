use std::ffi::CString;
use std::os::raw::c_char;
use anyhow::{anyhow, Context, Result};
use libloading::Library;
use log::{debug, info};
use once_cell::sync::OnceCell;
use crate::drivers::transport::DeviceTransport;
use crate::drivers::GeneratorError;
type ViStatus = i32;
type ViSession = u32;
#[cfg(target_pointer_width = "64")]
type ViAttrState = u64;
#[cfg(not(target_pointer_width = "64"))]
type ViAttrState = u32;
const VI_NULL: u32 = 0;
const VI_ATTR_TMO_VALUE: u32 = 0x3FFF_001A;
/// Read stopped because the buffer filled; more data follows.
const VI_SUCCESS_MAX_CNT: ViStatus = 0x3FFF_0006;
const READ_CHUNK: usize = 4096;
const MAX_REPLY: usize = 1 << 20;
struct VisaApi {
    #[allow(dead_code)]
    lib: Library,
    open_default_rm: unsafe extern "C" fn(*mut ViSession) -> ViStatus,
    open: unsafe extern "C" fn(ViSession, *const c_char, u32, u32, *mut ViSession) -> ViStatus,
    close: unsafe extern "C" fn(ViSession) -> ViStatus,
    write: unsafe extern "C" fn(ViSession, *const u8, u32, *mut u32) -> ViStatus,
    read: unsafe extern "C" fn(ViSession, *mut u8, u32, *mut u32) -> ViStatus,
    set_attribute: unsafe extern "C" fn(ViSession, u32, ViAttrState) -> ViStatus,
}
impl VisaApi {
    fn load(path: &str) -> Result<Self> {
        let lib = unsafe { Library::new(path) }
            .with_context(|| format!("VISA library {path} could not be loaded"))?;
        // Safety: signatures follow the VISA C API (VPP-4.3.2).
        unsafe {
            Ok(Self {
                open_default_rm: *lib.get(b"viOpenDefaultRM\0")?,
                open: *lib.get(b"viOpen\0")?,
                close: *lib.get(b"viClose\0")?,
                write: *lib.get(b"viWrite\0")?,
                read: *lib.get(b"viRead\0")?,
                set_attribute: *lib.get(b"viSetAttribute\0")?,
                lib,
            })
        }
    }
    /// The library is loaded once per process; later paths are ignored.
    fn instance(path: &str) -> Result<&'static VisaApi> {
        static API: OnceCell<VisaApi> = OnceCell::new();
        API.get_or_try_init(|| Self::load(path))
    }
}
fn check(status: ViStatus, ctx: &str) -> Result<ViStatus, GeneratorError> {
    if status < 0 {
        Err(GeneratorError::Transport(format!(
            "{ctx} failed (VISA status {:#010x})",
            status as u32
        )))
    } else {
        Ok(status)
    }
}
/// An open VISA instrument session (USB-TMC, LAN or GPIB, whatever the
/// installed VISA supports).
pub struct VisaSession {
    api: &'static VisaApi,
    resource_manager: ViSession,
    instrument: ViSession,
    resource: String,
}
impl VisaSession {
    pub fn open(library: &str, resource: &str, timeout_ms: u32) -> Result<Self> {
        let api = VisaApi::instance(library)?;
        let name = CString::new(resource).context("resource name contains a NUL byte")?;
        let mut resource_manager: ViSession = 0;
        check(
            unsafe { (api.open_default_rm)(&mut resource_manager as *mut ViSession) },
            "viOpenDefaultRM",
        )?;
        let mut instrument: ViSession = 0;
        let opened = check(
            unsafe {
                (api.open)(
                    resource_manager,
                    name.as_ptr(),
                    VI_NULL,
                    timeout_ms,
                    &mut instrument as *mut ViSession,
                )
            },
            "viOpen",
        );
        if let Err(err) = opened {
            unsafe { (api.close)(resource_manager) };
            return Err(anyhow!(err)).with_context(|| format!("cannot open {resource}"));
        }
        let session = Self {
            api,
            resource_manager,
            instrument,
            resource: resource.to_string(),
        };
        check(
            unsafe { (api.set_attribute)(instrument, VI_ATTR_TMO_VALUE, timeout_ms as ViAttrState) },
            "viSetAttribute",
        )?;
        info!("VISA session open: {resource}");
        Ok(session)
    }
    fn write_line(&mut self, command: &str) -> Result<(), GeneratorError> {
        let line = format!("{command}\n");
        let mut written: u32 = 0;
        check(
            unsafe {
                (self.api.write)(
                    self.instrument,
                    line.as_ptr(),
                    line.len() as u32,
                    &mut written as *mut u32,
                )
            },
            "viWrite",
        )?;
        if written as usize != line.len() {
            return Err(GeneratorError::Transport(format!(
                "short write: {written} of {} bytes",
                line.len()
            )));
        }
        Ok(())
    }
    fn read_reply(&mut self) -> Result<String, GeneratorError> {
        let mut reply = Vec::new();
        let mut chunk = vec![0u8; READ_CHUNK];
        loop {
            let mut count: u32 = 0;
            let status = check(
                unsafe {
                    (self.api.read)(
                        self.instrument,
                        chunk.as_mut_ptr(),
                        chunk.len() as u32,
                        &mut count as *mut u32,
                    )
                },
                "viRead",
            )?;
            reply.extend_from_slice(&chunk[..(count as usize).min(chunk.len())]);
            if status != VI_SUCCESS_MAX_CNT || reply.len() >= MAX_REPLY {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&reply).trim_end().to_string())
    }
}
impl DeviceTransport for VisaSession {
    fn send(&mut self, command: &str) -> Result<(), GeneratorError> {
        self.write_line(command)
    }
    fn query(&mut self, command: &str) -> Result<String, GeneratorError> {
        self.write_line(command)?;
        self.read_reply()
    }
}
impl Drop for VisaSession {
    fn drop(&mut self) {
        debug!("closing VISA session {}", self.resource);
        unsafe {
            (self.api.close)(self.instrument);
            (self.api.close)(self.resource_manager);
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn negative_status_is_an_error() {
        assert_eq!(check(0, "viWrite"), Ok(0));
        assert_eq!(check(VI_SUCCESS_MAX_CNT, "viRead"), Ok(VI_SUCCESS_MAX_CNT));
        let err = check(0xBFFF_0015u32 as i32, "viRead").unwrap_err();
        assert_eq!(
            err,
            GeneratorError::Transport("viRead failed (VISA status 0xbfff0015)".into())
        );
    }
    #[test]
    fn missing_library_is_reported() {
        assert!(VisaApi::load("no-such-visa-library.so").is_err());
    }
}
