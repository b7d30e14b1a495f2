use crate::config::Config;
use crate::models::triangle::Triangle;
use std::sync::Arc;
use tracing::info;
use colored::*;
use figlet_rs::FIGfont;

pub fn print_config(config: &Config) {
    let json = serde_json::to_string_pretty(config).unwrap_or_default();

    info!("\n{}: \n{}", String::from("[CONFIG]").blue().underline(), json.magenta());
}

fn banner(text: &str) -> String {
    FIGfont::standard()
        .ok()
        .and_then(|font| font.convert(text).map(|figure| figure.to_string()))
        .unwrap_or_else(|| text.to_string())
}

pub fn print_app_starting() {
    info!("\n{}", banner("TRI-ARB is starting..."));
}

pub fn print_app_started() {
    info!("\n{}", banner("TRI-ARB is STARTED!!!"));
}

/// List triangles with their legs, as printed by the `triangles` command
pub fn print_triangles(triangles: &[Arc<Triangle>]) {
    println!("{}", banner("Triangles"));
    for (i, triangle) in triangles.iter().enumerate() {
        let [ab, bc, ac] = triangle.symbols();
        println!(
            "{:5}. {:<24} {} | {} {} {}",
            i + 1,
            triangle.key.to_string().bright_white(),
            triangle.path().green(),
            ab.yellow(),
            bc.yellow(),
            ac.yellow()
        );
    }
    println!("{} {}", "Total:".bold(), triangles.len().to_string().bright_green());
}
