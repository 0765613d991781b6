use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use wabbitc::{CompileError, backend, compile};

fn main() -> Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let mut emit = "ir".to_string();
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--emit" | "-e" => {
                emit = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("Missing back-end name after {arg}"))?;
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let (file_name, source) = match input_path {
        Some(path) => {
            let source =
                fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?;
            (path, source)
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            ("<stdin>".to_string(), buffer)
        }
    };

    let output = match compile(&file_name, &source) {
        Ok(output) => output,
        Err(CompileError::Reported(diags)) => {
            eprint!("{}", diags.render());
            return Ok(ExitCode::FAILURE);
        }
        Err(error) => return Err(error.into()),
    };
    eprint!("{}", output.diagnostics.render());

    for backend in backend::backends().iter_mut() {
        if backend.name() == emit {
            let bytes = backend.emit(&output.ir, &output.symbols)?;
            io::stdout().write_all(&bytes).context("Writing output")?;
            return Ok(ExitCode::SUCCESS);
        }
    }

    bail!("Unknown back-end '{emit}'")
}
