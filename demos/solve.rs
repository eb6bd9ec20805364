use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use color_eyre::eyre::eyre;

use predicate_rs::partial::Solver;
use predicate_rs::resolve::Bindings;
use predicate_rs::types::{Sort, Value};

#[derive(Debug, Copy, Clone, ValueEnum)]
enum SortArg {
    Int,
    Bool,
    String,
}

impl From<SortArg> for Sort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Int => Sort::Int,
            SortArg::Bool => Sort::Bool,
            SortArg::String => Sort::String,
        }
    }
}

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Predicate, e.g. `age >= 18 && age < 21`.
    #[arg(value_name = "PREDICATE")]
    predicate: String,

    /// Identifier to enumerate. Without it, only satisfiability is reported.
    #[clap(long, value_name = "PATH")]
    query: Option<String>,

    /// Sort of the queried identifier.
    #[clap(long, value_enum, default_value = "int")]
    sort: SortArg,

    /// Known identifier, as `path=value` (`n=3`, `flag=true`, `stage="prod"`).
    #[clap(long = "bind", value_name = "PATH=VALUE")]
    bindings: Vec<String>,

    /// Timeout in milliseconds.
    #[clap(long, value_name = "MS", default_value = "5000")]
    timeout: u64,

    /// Enable debug logging.
    #[clap(short, long)]
    verbose: bool,
}

fn parse_binding(text: &str) -> color_eyre::Result<(String, Value)> {
    let (path, raw) = text
        .split_once('=')
        .ok_or_else(|| eyre!("binding `{}` is not of the form PATH=VALUE", text))?;
    let value = if let Ok(n) = raw.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else {
        Value::Str(raw.trim_matches('"').to_string())
    };
    Ok((path.trim().to_string(), value))
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        if args.verbose {
            simplelog::LevelFilter::Debug
        } else {
            simplelog::LevelFilter::Info
        },
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    println!("args = {:?}", args);

    let mut bindings = Bindings::new();
    for text in &args.bindings {
        let (path, value) = parse_binding(text)?;
        bindings.insert(&path, value);
    }

    let time_total = Instant::now();
    let timeout = Duration::from_millis(args.timeout);
    let mut solver = Solver::new();

    match &args.query {
        Some(query) => {
            let values = solver.solve_for_all(&args.predicate, &bindings, query, args.sort.into(), timeout)?;
            println!("Found {} value(s) for `{}`:", values.len(), query);
            for value in &values {
                println!("  {}", value);
            }
        }
        None => {
            let sat = solver.check(&args.predicate, &bindings, timeout)?;
            println!("{}", if sat { "satisfiable" } else { "unsatisfiable" });
        }
    }

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
