use colorful::{Color, Colorful};
use grab::cli::execute;
use log::debug;
use std::time::Instant;

fn main() {
    //初始化日志
    pretty_env_logger::init_timed();
    let begin = Instant::now();
    if let Err(error) = execute() {
        eprintln!("{}", format!("Error: {:#}", error).color(Color::Red));
        std::process::exit(1);
    }
    let end = begin.elapsed().as_millis();
    debug!("cost:{}ms", end);
}
