use std::fs;
use std::path::Path;

use anyhow::{Context, Result, ensure};

use wabbitc::fixtures::{Case, CaseClass, load_cases, normalize_output};
use wabbitc::ircode::serialize;
use wabbitc::{CompileError, compile};

fn run_case(case: &Case) -> Result<()> {
    let source = fs::read_to_string(&case.program_path)
        .with_context(|| format!("Reading {}", case.name))?;
    let result = compile("program.wb", &source);

    match case.spec.class {
        CaseClass::IrSuccess => {
            let output = match result {
                Ok(output) => output,
                Err(CompileError::Reported(diags)) => {
                    anyhow::bail!("Case {} failed to compile:\n{}", case.name, diags.render())
                }
                Err(error) => return Err(error.into()),
            };
            let ir_file = case
                .spec
                .ir_file
                .as_deref()
                .with_context(|| format!("Missing ir_file in {}", case.name))?;
            let expected = case.read_text(ir_file)?;
            let actual = serialize(&output.ir);
            ensure!(
                normalize_output(&actual) == normalize_output(&expected),
                "IR mismatch for {}:\n--- expected ---\n{}\n--- actual ---\n{}",
                case.name,
                expected,
                actual
            );
        }
        CaseClass::CompileError => {
            let diags = match result {
                Err(CompileError::Reported(diags)) => diags,
                Err(error) => return Err(error.into()),
                Ok(_) => anyhow::bail!("Case {} compiled but should not have", case.name),
            };
            let rendered = diags.render();
            let errors_file = case
                .spec
                .errors_contain_file
                .as_deref()
                .with_context(|| format!("Missing errors_contain_file in {}", case.name))?;
            for expected in case
                .read_text(errors_file)?
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
            {
                ensure!(
                    rendered.contains(expected),
                    "Case {}: expected diagnostic containing '{}', got:\n{}",
                    case.name,
                    expected,
                    rendered
                );
            }
        }
    }
    Ok(())
}

#[test]
fn runs_fixture_programs() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for case in cases {
        run_case(&case).with_context(|| format!("Case {}", case.name))?;
    }
    Ok(())
}

#[test]
fn fixture_compilations_are_deterministic() -> Result<()> {
    let cases = load_cases(Path::new("tests/programs"))?;
    for case in cases {
        if case.spec.class != CaseClass::IrSuccess {
            continue;
        }
        let source = fs::read_to_string(&case.program_path)
            .with_context(|| format!("Reading {}", case.name))?;
        let first = compile("program.wb", &source);
        let second = compile("program.wb", &source);
        match (first, second) {
            (Ok(first), Ok(second)) => {
                ensure!(
                    serialize(&first.ir) == serialize(&second.ir),
                    "Case {} is not deterministic",
                    case.name
                );
            }
            _ => anyhow::bail!("Case {} failed to compile", case.name),
        }
    }
    Ok(())
}
