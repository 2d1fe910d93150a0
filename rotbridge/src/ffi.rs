//! C ABI of the bridge.
//!
//! Every call opens its own channel and runtime. The call can be tuned with
//! environment variables, read anew on every call:
//! - `ROTBRIDGE_THREADS`: compute threads of the session, default 1
//! - `ROTBRIDGE_CACHE_DIR`: directory of the malicious base OT cache,
//!   default `data`
//! - `ROTBRIDGE_IO_TIMEOUT_MS`: deadline of every channel operation, default
//!   none
use std::{
    env,
    ffi::{CStr, OsString, c_char, c_int, c_longlong},
    panic::{self, AssertUnwindSafe},
    slice,
    str::FromStr,
    time::Duration,
};

use tracing::error;

use crate::{
    config::{CacheConfig, ProtocolMode, Role, RotConfig},
    error::{BridgeError, ConfigError},
    extract::{OutputBuffers, extract_into},
};

/// Returned by [`rot_random_ot`] on failure.
pub const ROT_ERROR: u64 = u64::MAX;

pub const THREADS_VAR: &str = "ROTBRIDGE_THREADS";
pub const CACHE_DIR_VAR: &str = "ROTBRIDGE_CACHE_DIR";
pub const IO_TIMEOUT_VAR: &str = "ROTBRIDGE_IO_TIMEOUT_MS";

/// Run a batch of `count` random OTs and return the number of bytes sent.
///
/// `party` 1 listens on `port` and writes `m0` to `data0` and `m1` to
/// `data1`. `party` 2 connects to `remote_addr:port` and writes `m` to
/// `data0` and the choice bits, one byte each, to `data1`. `mode` 0 selects
/// the semi-honest extension, any other value the malicious one. Returns
/// [`ROT_ERROR`] on failure, the error is logged.
///
/// # Safety
/// - `remote_addr` must be null or point to a NUL terminated string. It is
///   only read for `party` 2.
/// - If `count` is positive, `data0` and `data1` must each be valid for
///   writes of `count` bytes and must not overlap.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rot_random_ot(
    party: c_int,
    remote_addr: *const c_char,
    port: c_int,
    count: c_longlong,
    mode: c_int,
    data0: *mut u8,
    data1: *mut u8,
) -> u64 {
    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        // SAFETY: forwarded to the caller of this function
        unsafe { random_ot_ffi(party, remote_addr, port, count, mode, data0, data1) }
    }));
    match res {
        Ok(Ok(bytes_sent)) => bytes_sent,
        Ok(Err(err)) => {
            error!(error = %ErrorChain(&err), party, port, count, mode, "random OT failed");
            ROT_ERROR
        }
        Err(_) => {
            error!(party, port, count, mode, "random OT panicked");
            ROT_ERROR
        }
    }
}

unsafe fn random_ot_ffi(
    party: c_int,
    remote_addr: *const c_char,
    port: c_int,
    count: c_longlong,
    mode: c_int,
    data0: *mut u8,
    data1: *mut u8,
) -> Result<u64, BridgeError> {
    let role = Role::from_party(party)?;
    let port = u16::try_from(port).map_err(|_| ConfigError::InvalidPort(port.into()))?;
    let count = usize::try_from(count).map_err(|_| ConfigError::InvalidCount(count))?;
    if count > 0 && (data0.is_null() || data1.is_null()) {
        return Err(ConfigError::NullBuffer.into());
    }
    let remote_addr = match role {
        Role::Initiator => None,
        // SAFETY: remote_addr is null or a NUL terminated string
        Role::Responder => unsafe { read_addr(remote_addr)? },
    };
    let config = RotConfig::new(role, remote_addr, port)
        .with_count(count)
        .with_mode(ProtocolMode::from_mode_num(mode));
    let config = apply_env(config)?;

    let batch = crate::random_ot_raw_blocking(&config)?;
    if count > 0 {
        // SAFETY: both pointers are non-null, valid for count bytes and do
        // not overlap
        let (out0, out1) = unsafe {
            (
                slice::from_raw_parts_mut(data0, count),
                slice::from_raw_parts_mut(data1, count),
            )
        };
        let out = match role {
            Role::Initiator => OutputBuffers::Sender { m0: out0, m1: out1 },
            Role::Responder => OutputBuffers::Receiver {
                m: out0,
                choices: out1,
            },
        };
        extract_into(&batch.correlations, out);
    }
    Ok(batch.cost.bytes_sent)
}

unsafe fn read_addr(addr: *const c_char) -> Result<Option<String>, ConfigError> {
    if addr.is_null() {
        return Ok(None);
    }
    // SAFETY: addr is a NUL terminated string
    let addr = unsafe { CStr::from_ptr(addr) };
    addr.to_str()
        .map(|addr| Some(addr.to_owned()))
        .map_err(|_| ConfigError::NonUtf8Address)
}

fn apply_env(config: RotConfig) -> Result<RotConfig, ConfigError> {
    apply_overrides(config, env::var_os)
}

fn apply_overrides(
    mut config: RotConfig,
    lookup: impl Fn(&'static str) -> Option<OsString>,
) -> Result<RotConfig, ConfigError> {
    if let Some(threads) = parse_var::<usize>(THREADS_VAR, lookup(THREADS_VAR))? {
        config = config.with_threads(threads);
    }
    if let Some(dir) = lookup(CACHE_DIR_VAR) {
        let port = config.port();
        config = config.with_cache(CacheConfig::for_port(port).with_dir(dir));
    }
    if let Some(ms) = parse_var::<u64>(IO_TIMEOUT_VAR, lookup(IO_TIMEOUT_VAR))? {
        config = config.with_io_timeout(Duration::from_millis(ms));
    }
    Ok(config)
}

fn parse_var<T: FromStr>(
    var: &'static str,
    value: Option<OsString>,
) -> Result<Option<T>, ConfigError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value
        .into_string()
        .map_err(|value| ConfigError::InvalidEnv {
            var,
            value: value.to_string_lossy().into_owned(),
        })?;
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}

/// Displays an error with all its sources.
struct ErrorChain<'a>(&'a (dyn std::error::Error + 'static));

impl std::fmt::Display for ErrorChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(err) = source {
            write!(f, ": {err}")?;
            source = err.source();
        }
        Ok(())
    }
}
