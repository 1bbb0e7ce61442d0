#[macro_export]
macro_rules! bridge_trace {
    ($src:expr, $($format:tt)*) => {
        if $src.tracer_enabled() {
            $src.tracer().msg(format_args!($($format)*))
        }
    };
}

/// Formats a wire word for traces without dereferencing it.
#[macro_export]
macro_rules! bridge_trace_wire {
    ($src:expr, $what:expr, $bits:expr) => {
        if $src.tracer_enabled() {
            $src.tracer().msg(format_args!(
                "{} {:?}",
                $what,
                $crate::bridge::boxing::classify($bits)
            ))
        }
    };
}
