use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tileroute::{DirectoryStore, Point, Router};

#[derive(Parser)]
struct Cli {
    /// Directory holding partition containers (.tile and .tile.routing files)
    tile_dir: PathBuf,

    /// Name of the partition containing both points
    partition: String,

    /// X coordinate of the start point, in projected map units
    start_x: f64,

    /// Y coordinate of the start point
    start_y: f64,

    /// X coordinate of the destination
    end_x: f64,

    /// Y coordinate of the destination
    end_y: f64,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    colog::init();
    let cli = Cli::parse();

    let partition = cli.partition.clone();
    let mut router = Router::new(
        DirectoryStore::new(&cli.tile_dir),
        DirectoryStore::new(&cli.tile_dir),
        move |_: &Point| partition.clone(),
    );

    let route = router.route(
        Point::new(cli.start_x, cli.start_y),
        Point::new(cli.end_x, cli.end_y),
    )?;

    println!("{{");
    println!("  \"type\": \"FeatureCollection\",");
    println!("  \"features\": [");
    println!("    {{");
    println!("      \"type\": \"Feature\",");
    println!("      \"properties\": {{}},");

    println!("      \"geometry\": {{");
    println!("        \"type\": \"LineString\",");
    println!("        \"coordinates\": [");

    let mut points = route.geometry().iter().peekable();
    while let Some(point) = points.next() {
        let suffix = if points.peek().is_some() { "," } else { "" };
        println!("          [{}, {}]{}", point.x, point.y, suffix);
    }

    println!("        ]");
    println!("      }}");
    println!("    }}");
    println!("  ]");
    println!("}}");

    Ok(())
}
