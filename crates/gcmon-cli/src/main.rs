mod cli;

use std::process;

use gcmon_core::interrupt;

fn main() {
    if let Err(e) = cli::run() {
        if e.downcast_ref::<interrupt::InterruptedError>().is_some() {
            process::exit(interrupt::INTERRUPTED_EXIT_CODE);
        }
        eprintln!("{e:#}"); // pretty anyhow chain
        process::exit(1);
    }
}
