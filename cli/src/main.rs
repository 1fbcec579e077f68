use std::io::{self, BufRead};
use std::process::ExitCode;

use chembal::{BalanceError, Equation};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

// 0 = success, 1 = parse error, 2 = unbalanceable or ambiguous system
fn exit_code(error: &BalanceError) -> ExitCode {
    match error {
        BalanceError::MalformedEquation(_) | BalanceError::MalformedFormula { .. } => {
            ExitCode::from(1)
        }
        _ => ExitCode::from(2),
    }
}

fn main() -> ExitCode {
    TermLogger::init(
        LevelFilter::Warn,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .ok();

    println!("Enter the equation (use -> between reactants and products): ");
    let mut input = String::new();
    if io::stdin().lock().read_line(&mut input).is_err() || input.trim().is_empty() {
        eprintln!("error: no equation given");
        return ExitCode::from(1);
    }

    let mut equation = match Equation::parse(&input) {
        Ok(equation) => equation,
        Err(error) => {
            eprintln!("error: {error}");
            return exit_code(&error);
        }
    };
    if let Err(error) = equation.solve() {
        eprintln!("error: {error}");
        return exit_code(&error);
    }

    println!("\nBalanced equation:\n{}", equation.display_str().unwrap());
    ExitCode::SUCCESS
}
