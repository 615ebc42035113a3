use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

mod access;
mod catalog;
mod config;
mod error;
mod execution;
mod optimizer;
mod parser;
mod plan;
mod query;
mod result;
mod types;

use config::QpConfig;
use error::QpError;
use optimizer::{IterativeImprovement, SimulatedAnnealing};
use result::ResultWriter;

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() != 5 {
        eprintln!("usage: {} <queryfile> <resultfile> <pagesize> <numbuffers>", args[0]);
        return ExitCode::FAILURE;
    }
    match run(&args[1], &args[2], &args[3], &args[4]) {
        Ok(rows) => {
            info!("{} result rows written", rows);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(
    query_file: &str,
    result_file: &str,
    page_size: &str,
    num_buffers: &str,
) -> Result<u64, QpError> {
    let page_size: usize = page_size
        .parse()
        .map_err(|_| QpError::Config(format!("invalid page size {}", page_size)))?;
    let num_buffers: usize = num_buffers
        .parse()
        .map_err(|_| QpError::Config(format!("invalid buffer count {}", num_buffers)))?;

    let text = fs::read_to_string(query_file)?;
    let query = parser::parse_query_file(&text)?;

    // Table files live next to the query file.
    let data_dir = PathBuf::from(query_file)
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let config = QpConfig::new(data_dir, page_size, num_buffers);
    let uses_sort = query.distinct || !query.group_by.is_empty();
    config.check_buffers(query.joins.len(), uses_sort)?;

    let mut rng = StdRng::from_entropy();
    let improved = IterativeImprovement::new(&config, &query).optimize(&mut rng)?;
    info!(
        "iterative improvement found cost {}",
        optimizer::cost::cost_of(&config, &improved)?
    );
    let plan = SimulatedAnnealing::with_start_plan(&config, &query, improved)
        .optimize(&mut rng)?;
    info!("final plan cost {}", optimizer::cost::cost_of(&config, &plan)?);
    info!("final plan:\n{}", plan);

    let limit = plan.limit;
    let offset = plan.offset;
    let mut root = execution::build_exec_plan(&config, &plan)?;
    ResultWriter::new(limit, offset).write_file(result_file.as_ref(), root.as_mut())
}
