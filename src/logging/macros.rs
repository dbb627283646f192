// SPDX-License-Identifier: Apache-2.0 OR MIT
// Formatting macros over the logger facade

/// Format a message and write it through a [`Logger`](crate::logging::Logger)
///
/// # Examples
/// ```ignore
/// log_msg!(logger, "job {} finished in {} ms", id, elapsed);
/// ```
#[macro_export]
macro_rules! log_msg {
    ($logger:expr, $msg:expr) => {
        $logger.write_to_log($msg)
    };
    ($logger:expr, $fmt:expr, $($arg:tt)+) => {
        $logger.write_to_log(format!($fmt, $($arg)+))
    };
}

/// Format a message and write it through a registered context handle
///
/// # Examples
/// ```ignore
/// let handle = logger.register_context("Uploader");
/// log_with!(logger, &handle, "sent {} bytes", n);
/// ```
#[macro_export]
macro_rules! log_with {
    ($logger:expr, $handle:expr, $msg:expr) => {
        $logger.write_with($handle, $msg)
    };
    ($logger:expr, $handle:expr, $fmt:expr, $($arg:tt)+) => {
        $logger.write_with($handle, format!($fmt, $($arg)+))
    };
}
