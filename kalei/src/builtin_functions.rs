use kalei_value::Value;
use kalei_vm::session::Session;
use std::io::{self, Write};

/// Registers the builtin functions. Scripts still need an `extern` declaration to call them.
pub fn install(session: &mut Session) {
    session.add_native("putchard", 1, putchard);
    session.add_native("printd", 1, printd);
    session.add_native("sin", 1, |args| args[0].sin());
    session.add_native("cos", 1, |args| args[0].cos());
    session.add_native("sqrt", 1, |args| args[0].sqrt());
}

/// Writes the character with code `x` to stderr.
pub fn putchard(args: &[Value]) -> Value {
    let byte = args[0] as u8;
    let mut stderr = io::stderr();
    // nothing sensible to return on a failed write
    let _ = stderr.write_all(&[byte]);
    0.0
}

/// Prints `x` to stderr.
pub fn printd(args: &[Value]) -> Value {
    eprintln!("{:.6}", args[0]);
    0.0
}
