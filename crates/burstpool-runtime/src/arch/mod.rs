//! Architecture-specific syscall and thread primitives
//!
//! Everything the pool needs from the machine: the raw syscall
//! instruction at each arity, the pause hint, thread-pointer reads, and
//! the clone3 invocation whose child starts on a caller-built stack.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
        pub use x86_64 as current;
    } else {
        compile_error!("unsupported architecture");
    }
}
