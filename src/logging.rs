//! Crate-local logging macros.
//!
//! Events are emitted through `tracing` under the `eth_history` target when the `tracing`
//! feature is enabled. With the feature disabled every call compiles down to a no-op that
//! still evaluates (borrows) its field expressions, so no unused-variable warnings leak out.
//!
//! Spans are not affected by the feature: each component is handed its own [`tracing::Span`]
//! at construction and instruments its futures with it.

#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {
        tracing::error!(target: "eth_history", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! error {
    ($($arg:tt)*) => {
        $crate::__log_consume!($($arg)*)
    };
}

#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "eth_history", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! warn {
    ($($arg:tt)*) => {
        $crate::__log_consume!($($arg)*)
    };
}

#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => {
        tracing::info!(target: "eth_history", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! info {
    ($($arg:tt)*) => {
        $crate::__log_consume!($($arg)*)
    };
}

#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "eth_history", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! debug {
    ($($arg:tt)*) => {
        $crate::__log_consume!($($arg)*)
    };
}

#[cfg(feature = "tracing")]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "eth_history", $($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! trace {
    ($($arg:tt)*) => {
        $crate::__log_consume!($($arg)*)
    };
}

// Supports `field = value` pairs followed by a message literal and its format arguments.
#[doc(hidden)]
#[macro_export]
#[cfg(not(feature = "tracing"))]
#[allow(unused_macros)]
macro_rules! __log_consume {
    ($field:ident = % $value:expr, $($rest:tt)*) => {
        { let _ = &$value; $crate::__log_consume!($($rest)*); }
    };
    ($field:ident = ? $value:expr, $($rest:tt)*) => {
        { let _ = &$value; $crate::__log_consume!($($rest)*); }
    };
    ($field:ident = $value:expr, $($rest:tt)*) => {
        { let _ = &$value; $crate::__log_consume!($($rest)*); }
    };
    ($lit:literal $(, $arg:expr)* $(,)?) => {
        { $(let _ = &$arg;)* }
    };
    () => {};
}

#[cfg(test)]
mod tests {
    #[test]
    fn message_accepts_fields_and_format_arguments() {
        let block = 7_u64;
        let reason = "gone";

        debug!(block = block, "Fetching block {}", block);
        warn!(reason = %reason, "Block {block} failed: {}", reason);
        info!("Recovered {} blocks", block + 1);
        trace!("Done");
    }
}
