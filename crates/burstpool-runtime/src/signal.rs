//! Process-wide SIGSEGV handling for worker faults
//!
//! Installed once at first pool construction and never uninstalled. The
//! handler runs on the faulting worker's alternate stack, so overflows
//! into a guard page are reported instead of recursing into the same
//! page. It identifies the worker through thread-pointer-relative
//! storage, writes one diagnostic line with the raw write syscall, then
//! re-raises and exits the whole process with 128+signo.
//!
//! Everything in the handler path must be async-signal-safe: no
//! formatting machinery, no allocation, no locks.

use std::sync::atomic::{AtomicBool, Ordering};

use burstpool_core::error::{Errno, PoolResult, SpawnError};

use crate::arch::current as arch;
use crate::sys;
use crate::tls;

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Install the SIGSEGV fault handler (idempotent)
pub fn install_fault_handler() -> PoolResult<()> {
    if HANDLER_INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    let act = sys::KernelSigaction {
        handler: segv_handler as usize,
        flags: (libc::SA_SIGINFO | libc::SA_ONSTACK) as u64 | sys::SA_RESTORER,
        restorer: arch::sigreturn_restorer as usize,
        mask: 0,
    };

    let ret = unsafe { sys::rt_sigaction(libc::SIGSEGV, &act) };
    if ret < 0 {
        HANDLER_INSTALLED.store(false, Ordering::SeqCst);
        return Err(SpawnError::SignalSetupFailed(Errno::from_ret(ret)).into());
    }
    Ok(())
}

/// Whether the handler has been installed in this process
pub fn fault_handler_installed() -> bool {
    HANDLER_INSTALLED.load(Ordering::SeqCst)
}

/// Fixed-size line formatter; the only string machinery a signal
/// handler may use
struct LineBuf {
    buf: [u8; 192],
    len: usize,
}

impl LineBuf {
    const fn new() -> Self {
        Self {
            buf: [0; 192],
            len: 0,
        }
    }

    fn push_str(&mut self, s: &str) {
        for &b in s.as_bytes() {
            if self.len < self.buf.len() {
                self.buf[self.len] = b;
                self.len += 1;
            }
        }
    }

    fn push_dec(&mut self, v: i64) {
        if v < 0 {
            self.push_str("-");
            // i64::MIN never appears in worker ids.
            return self.push_dec(-v);
        }
        let mut digits = [0u8; 20];
        let mut n = 0;
        let mut v = v as u64;
        loop {
            digits[n] = b'0' + (v % 10) as u8;
            v /= 10;
            n += 1;
            if v == 0 {
                break;
            }
        }
        while n > 0 {
            n -= 1;
            if self.len < self.buf.len() {
                self.buf[self.len] = digits[n];
                self.len += 1;
            }
        }
    }

    fn push_hex(&mut self, v: u64) {
        self.push_str("0x");
        let mut started = false;
        for shift in (0..16).rev() {
            let nibble = ((v >> (shift * 4)) & 0xF) as usize;
            if nibble != 0 || started || shift == 0 {
                started = true;
                let c = b"0123456789abcdef"[nibble];
                if self.len < self.buf.len() {
                    self.buf[self.len] = c;
                    self.len += 1;
                }
            }
        }
    }
}

/// The SIGSEGV handler body
unsafe extern "C" fn segv_handler(
    signo: i32,
    info: *mut libc::siginfo_t,
    ucontext: *mut libc::c_void,
) {
    let worker = tls::current_worker_id();

    let fault_addr = if info.is_null() {
        0
    } else {
        (*info).si_addr() as u64
    };

    let (rip, rsp) = if ucontext.is_null() {
        (0, 0)
    } else {
        let uc = &*(ucontext as *const libc::ucontext_t);
        (
            uc.uc_mcontext.gregs[libc::REG_RIP as usize] as u64,
            uc.uc_mcontext.gregs[libc::REG_RSP as usize] as u64,
        )
    };

    let mut line = LineBuf::new();
    line.push_str("burstpool: SIGSEGV in worker ");
    line.push_dec(worker);
    line.push_str(": addr=");
    line.push_hex(fault_addr);
    line.push_str(" rip=");
    line.push_hex(rip);
    line.push_str(" rsp=");
    line.push_hex(rsp);
    line.push_str("\n");
    sys::write(2, line.buf.as_ptr(), line.len);

    // Re-raise at the faulting thread, then take the whole process down.
    sys::tgkill(sys::getpid(), sys::gettid(), signo);
    sys::exit_group(128 + signo);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut LineBuf)) -> String {
        let mut b = LineBuf::new();
        f(&mut b);
        String::from_utf8(b.buf[..b.len].to_vec()).unwrap()
    }

    #[test]
    fn test_push_dec() {
        assert_eq!(render(|b| b.push_dec(0)), "0");
        assert_eq!(render(|b| b.push_dec(42)), "42");
        assert_eq!(render(|b| b.push_dec(-1)), "-1");
        assert_eq!(render(|b| b.push_dec(1234567)), "1234567");
    }

    #[test]
    fn test_push_hex() {
        assert_eq!(render(|b| b.push_hex(0)), "0x0");
        assert_eq!(render(|b| b.push_hex(0xdead_beef)), "0xdeadbeef");
        assert_eq!(render(|b| b.push_hex(u64::MAX)), "0xffffffffffffffff");
    }

    #[test]
    fn test_truncation_is_safe() {
        let mut b = LineBuf::new();
        for _ in 0..100 {
            b.push_str("0123456789");
        }
        assert_eq!(b.len, b.buf.len());
    }

    #[test]
    fn test_install_idempotent() {
        assert!(install_fault_handler().is_ok());
        assert!(fault_handler_installed());
        assert!(install_fault_handler().is_ok());
    }
}
