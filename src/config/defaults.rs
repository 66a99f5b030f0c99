//! Build-time constants. None of these are runtime-configurable.

use std::time::Duration;

/// Capacity of the coalescing output buffer.
pub const OUTPUT_BUFFER_CAPACITY: usize = 128;

/// Period of the flush/poll timer.
pub const TIMER_PERIOD: Duration = Duration::from_millis(20);

/// Longest a console write waits for the engine lock before dropping its bytes.
pub const PUSH_LOCK_TIMEOUT: Duration = Duration::from_millis(100);

/// Longest `unregister` waits for the engine lock before tearing down anyway.
pub const UNREGISTER_LOCK_TIMEOUT: Duration = Duration::from_millis(1000);

/// Longest the stdin injector waits for room in the input queue per byte.
pub const STDIN_ENQUEUE_TIMEOUT: Duration = Duration::from_millis(500);

pub const READER_TASK_STACK_SIZE: usize = 64 * 1024;
pub const READER_TASK_CHUNK: usize = 64;
pub const POLL_READ_CHUNK: usize = 64;

/// Pause between retries when a blocking stream read sees a transient would-block.
pub const STREAM_RETRY_DELAY: Duration = Duration::from_millis(20);

pub const INPUT_QUEUE_CAPACITY: usize = 256;
pub const COOKED_CHUNK: usize = 64;

/// Ctrl-C.
pub const DEFAULT_INTERRUPT_CHAR: u8 = 0x03;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8266";
