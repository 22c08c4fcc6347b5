use std::fs;
use std::io;

use anyhow::{bail, Context};
use clap::{App, Arg};
use log::info;

use kaleido::eval::Evaluator;
use kaleido::lexer::{Lexer, ReaderSource};
use kaleido::{Driver, Parser, PrecedenceTable, Token};

fn print_tokens<I: Iterator<Item = u8>>(mut lexer: Lexer<I>) -> anyhow::Result<()> {
    loop {
        match lexer.next_token()? {
            Token::Eof => return Ok(()),
            token => println!("{}\t{}", lexer.position(), token),
        }
    }
}

fn run<I: Iterator<Item = u8>>(
    lexer: Lexer<I>,
    precedence: PrecedenceTable,
    evaluate: bool,
    interactive: bool,
) -> anyhow::Result<()> {
    let parser = Parser::new(lexer, precedence)?;
    let mut driver = Driver::new(parser);
    if evaluate {
        driver = driver.with_evaluator(Evaluator::new());
    }

    let errors = driver.run_interactive(
        || {
            if interactive {
                eprint!("ready> ");
            }
        },
        |outcome| {
            if outcome.is_error() {
                eprintln!("{}", outcome);
            } else {
                println!("{}", outcome);
            }
        },
    );

    if errors > 0 {
        bail!("{} error(s) reported", errors);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = App::new("kaleido")
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::with_name("FILE")
                .help("source file to run, reads stdin interactively when omitted")
                .index(1),
        )
        .arg(
            Arg::with_name("ast")
                .long("ast")
                .help("print parsed items instead of evaluating them"),
        )
        .arg(
            Arg::with_name("tokens")
                .long("tokens")
                .conflicts_with("ast")
                .help("print the token stream and exit"),
        )
        .arg(
            Arg::with_name("op")
                .long("op")
                .value_name("OP=PREC")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("bind a binary operator precedence, a non-positive value disables it"),
        )
        .get_matches();

    let mut precedence = PrecedenceTable::default();
    if let Some(bindings) = matches.values_of("op") {
        for binding in bindings {
            precedence
                .apply_binding(binding)
                .with_context(|| format!("invalid --op {}", binding))?;
        }
    }
    info!("operator precedence: {:?}", precedence.operators());

    let evaluate = !matches.is_present("ast");
    let tokens = matches.is_present("tokens");

    match matches.value_of("FILE") {
        Some(path) => {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path))?;
            let lexer = Lexer::from_source(&source);
            if tokens {
                return print_tokens(lexer);
            }
            run(lexer, precedence, evaluate, false)
        }
        None => {
            let stdin = io::stdin();
            let lexer = Lexer::new(ReaderSource::new(stdin.lock()));
            if tokens {
                return print_tokens(lexer);
            }
            run(lexer, precedence, evaluate, true)
        }
    }
}
