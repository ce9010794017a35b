// Crate-local logging under the `chartframe` target. Without the `tracing` feature every macro
// expands to nothing. `$d` carries a literal `$` into the generated macros.
macro_rules! log_macros {
    ($d:tt $($name:ident => $level:ident),+ $(,)?) => {
        $(
            #[cfg(feature = "tracing")]
            macro_rules! $name {
                ($d($d tt:tt)*) => {
                    tracing::$level!(target: "chartframe", $d($d tt)*)
                };
            }

            #[cfg(not(feature = "tracing"))]
            macro_rules! $name {
                ($d($d tt:tt)*) => {};
            }
        )+
    };
}

log_macros!($
    ctrace => trace,
    cdebug => debug,
    cwarn => warn,
);
