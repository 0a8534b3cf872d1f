use chrono::Local;
use colored::*;
use env_logger::fmt::Formatter;
use log::{Level, Record};
use std::io::Write;

pub fn init_logger(log_level: &str) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level));
    builder.format(format_log);

    // Filter out logs from actix_server and actix_web
    builder.filter(Some("actix_server"), log::LevelFilter::Warn);
    builder.filter(Some("actix_web"), log::LevelFilter::Warn);

    builder.init();
}

fn format_log(buf: &mut Formatter, record: &Record) -> std::io::Result<()> {
    let level_style = match record.level() {
        Level::Error => "ERROR".truecolor(255, 0, 0),
        Level::Warn => "WARN".truecolor(255, 165, 0),
        Level::Info => "INFO".truecolor(0, 255, 255),
        Level::Debug => "DEBUG".truecolor(138, 43, 226),
        Level::Trace => "TRACE".truecolor(255, 105, 180),
    };

    let message = format!(
        "{} [{}] - {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        level_style,
        record.args()
    );

    writeln!(buf, "{}", message)
}

pub fn print_banner(host: &str, port: u16) {
    let border = "=".repeat(60);
    println!("{}", border.purple());
    println!("{}", "  usher - guided tours backend".cyan().bold());
    println!("{}", format!("  - Address: http://{}:{}", host, port).cyan());
    println!("{}", border.purple());
}
