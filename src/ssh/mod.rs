//! External SSH tooling: `ssh`, `ssh-keygen` and `sudo` behind a runner trait

mod connect;
mod keygen;
mod runner;

pub use connect::{connect, connect_args};
pub use keygen::{
    fingerprint_args, parse_fingerprint, KeyGenRequest, KeyType, DEFAULT_RSA_BITS, KEYGEN,
};
pub use runner::{run_checked, ProcessOutput, ProcessRunner, ProcessStatus, SystemRunner};

#[cfg(test)]
pub use runner::testing;
