use std::process::ExitCode;

use clap::Parser;
use env_logger::Env;

use fair_admission::{error::EXIT_BAD_ARGS, report, run_day, Costs, DayConfig, GateKind};

#[derive(Parser, Debug)]
#[command(name = "fair-admission")]
#[command(about = "Simulates a day of customers queueing for baristas, self-serve machines and cashiers", long_about = None)]
struct Cli {
    /// Customers arriving during the day
    customers: usize,
    #[arg(short = 'b', long, default_value_t = 0, help = "Barista stations")]
    baristas: u32,
    #[arg(
        short = 's',
        long,
        default_value_t = 0,
        help = "Self-serve stations, 3 machines each (0 = single stage)"
    )]
    self_serves: u32,
    #[arg(short = 'c', long, default_value_t = 0, help = "Cashier stations (two stage only)")]
    cashiers: u32,
    #[arg(short = 'q', long, help = "Only print the results")]
    quiet: bool,
    #[arg(long, help = "Seed for the order kinds, random if not given")]
    seed: Option<u64>,
    #[arg(long, default_value_t = GateKind::Fifo, help = "Admission gate: fifo or plain")]
    gate: GateKind,
    #[arg(long, default_value_t = 1, help = "Divide service and payment costs by this")]
    cost_divisor: u64,
    #[arg(long, default_value_t = DayConfig::DEFAULT_STACK_SIZE, help = "Stack size of customer threads")]
    stack_size: usize,
    #[arg(long, default_value_t = DayConfig::DEFAULT_SPAWN_RETRIES, help = "Retries per customer thread")]
    spawn_retries: u32,
}

impl Cli {
    fn into_config(self) -> Result<DayConfig, &'static str> {
        if self.customers == 0 {
            return Err("Need at least one customer");
        }
        if self.baristas == 0 {
            return Err("Need at least one barista");
        }
        if self.self_serves > 0 && self.cashiers == 0 {
            return Err("Need at least one cashier");
        }
        Ok(DayConfig {
            self_serves: self.self_serves,
            cashiers: self.cashiers,
            costs: Costs::STANDARD.scaled_down(self.cost_divisor),
            gate: self.gate,
            seed: self.seed,
            spawn_retries: self.spawn_retries,
            stack_size: self.stack_size,
            ..DayConfig::new(self.customers, self.baristas)
        })
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let quiet = cli.quiet;

    let default_level = if quiet { "off" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level)).init();

    let config = match cli.into_config() {
        Ok(config) => config,
        Err(message) => {
            if !quiet {
                eprintln!("ERROR: {message}");
            }
            return ExitCode::from(EXIT_BAD_ARGS);
        }
    };

    if !quiet {
        println!("{}", report::configuration(&config));
    }

    match run_day(&config) {
        Ok(day) => {
            println!("{}", report::results(&day, !quiet));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
