pub mod builtin_functions;

use kalei_parser::ast::Item;
use kalei_parser::parser::Parser;
use kalei_source::Source;
use kalei_value::Value;
use kalei_vm::session::Session;
use std::sync::Once;
use tracing::warn;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Enable with `RUST_LOG=kalei_vm=debug` or `RUST_LOG=kalei_passes=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Parses `source`, logging syntax errors. Items that failed to parse are left out.
pub fn parse(source: &str) -> Vec<Item> {
    let source = Source::new(source);
    let items = Parser::new(&source).parse_program();
    if !source.has_no_errors() {
        warn!(errors = source.errors.len(), "{}", source.report().trim_end());
    }
    items
}

/// A session with the builtin functions installed.
pub fn new_session() -> Session {
    let mut session = Session::default();
    builtin_functions::install(&mut session);
    session
}

/// Runs `source` in a fresh session and returns the value of every top-level expression that
/// succeeded, in order.
pub fn evaluate(source: &str) -> Vec<Value> {
    new_session().evaluate(&parse(source))
}

/// Prints the IR generated for `source`. `debug` disables optimization.
pub fn assembly(source: &str, debug: bool) -> String {
    new_session().assembly(&parse(source), debug)
}
