use kalei::builtin_functions;
use kalei_parser::parser::Parser;
use kalei_parser::precedence::PrecedenceTable;
use kalei_source::Source;
use kalei_vm::session::{Session, SessionOptions};
use std::io::{self, Write};
use std::{env, fs, mem, process};

const USAGE: &str = "usage: kalei [--debug | -O0] [--dump-bytecode] [--emit-ir] [script]";

struct Repl {
    session: Session,
    /// Operators defined by earlier input.
    precedence: PrecedenceTable,
    emit_ir: bool,
}

impl Repl {
    fn run_source(&mut self, content: &str) {
        let source = Source::new(content);
        let mut parser = Parser::with_precedence(&source, mem::take(&mut self.precedence));
        let items = parser.parse_program();
        self.precedence = parser.into_precedence();
        eprint!("{}", source.report());

        if self.emit_ir {
            let debug = !self.session.options().optimize;
            print!("{}", self.session.assembly(&items, debug));
            return;
        }
        for item in &items {
            match self.session.eval_item(item) {
                Ok(Some(value)) => println!("Evaluated to {:.6}", value),
                Ok(None) => {}
                Err(err) => eprintln!("Error: {}", err),
            }
        }
    }

    fn run_prompt(&mut self) -> io::Result<()> {
        let mut stdout = io::stdout();
        let stdin = io::stdin();
        loop {
            print!("ready> ");
            stdout.flush()?;

            let mut input = String::new();
            if stdin.read_line(&mut input)? == 0 {
                println!();
                return Ok(());
            }
            self.run_source(&input);
        }
    }
}

fn main() {
    kalei::init_tracing();

    let mut options = SessionOptions::default();
    let mut emit_ir = false;
    let mut script = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--debug" | "-O0" => options.optimize = false,
            "--dump-bytecode" => options.dump_bytecode = true,
            "--emit-ir" => emit_ir = true,
            "--help" | "-h" => {
                println!("{}", USAGE);
                return;
            }
            _ if arg.starts_with('-') => {
                eprintln!("unknown option `{}`\n{}", arg, USAGE);
                process::exit(2);
            }
            _ => script = Some(arg),
        }
    }

    let mut session = Session::new(options);
    builtin_functions::install(&mut session);
    let mut repl = Repl {
        session,
        precedence: PrecedenceTable::default(),
        emit_ir,
    };

    match script {
        Some(path) => match fs::read_to_string(&path) {
            Ok(content) => repl.run_source(&content),
            Err(err) => {
                eprintln!("cannot read `{}`: {}", path, err);
                process::exit(1);
            }
        },
        None => {
            if let Err(err) = repl.run_prompt() {
                eprintln!("{}", err);
                process::exit(1);
            }
        }
    }
}
