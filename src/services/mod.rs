mod harness;
mod wait;

pub use harness::{
    DEFAULT_COMPOSE_FILE, TestHarness, dump_environment, update_env_file,
};
pub use wait::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT, Poll, WaitOptions, wait_until};
