use std::env;
use std::io::{self, Write};

use syntak::MathEvaluator;

/// Evaluates one expression per line read from `source`, printing the
/// `f64` result or reporting the evaluator's error to stderr.
fn run(evaluator: &mut MathEvaluator<f64>, source: &str) {
    let source = source.trim();
    if source.is_empty() {
        return;
    }
    match evaluator.evaluate(source) {
        Ok(value) => println!("{}", value),
        Err(err) => eprintln!("error: {}", err),
    }
}

fn run_prompt(evaluator: &mut MathEvaluator<f64>) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush().unwrap();

        let mut line = String::new();
        let bytes_read = stdin.read_line(&mut line).unwrap();
        if bytes_read == 0 {
            break; // EOF or Control-D
        }
        run(evaluator, &line);
    }
}

pub fn main() {
    let args: Vec<String> = env::args().collect();
    let mut evaluator: MathEvaluator<f64> = MathEvaluator::new();
    evaluator.add_constant("pi", std::f64::consts::PI).unwrap();
    evaluator.add_constant("e", std::f64::consts::E).unwrap();
    evaluator.add_function1("sin", f64::sin).unwrap();
    evaluator.add_function1("cos", f64::cos).unwrap();
    evaluator.add_function1("sqrt", f64::sqrt).unwrap();
    evaluator.add_function2("pow", f64::powf).unwrap();

    // args always includes the program name in args[0]
    match args.len() {
        1 => run_prompt(&mut evaluator),
        2 => run(&mut evaluator, &args[1]),
        _ => {
            println!("Usage: syntak [expression]");
            std::process::exit(64);
        }
    }
}
