use std::env;
use std::fs::{create_dir_all, File};
use std::io::{self, stdout, Write};
use std::path::Path;

use chrono::{DateTime, TimeDelta};
use rand::seq::IndexedRandom;
use rand::Rng;

const PROBABILITY_INVALID: f64 = 0.002;
const PROBABILITY_LARGE_LOAD: f64 = 0.05;
const SPAN_MINUTES: i64 = 8 * 7 * 24 * 60;

struct GeneratorConfig {
    num_records: usize,
    num_customers: usize,
    output_path: String,
}

impl GeneratorConfig {
    fn from_args() -> Self {
        let args: Vec<String> = env::args().collect();
        let num_records = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(1_000_000);
        let num_customers = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(10_000);

        Self {
            num_records,
            num_customers: num_customers.max(1),
            output_path: "samples/stress_test.txt".to_string(),
        }
    }
}

fn main() -> io::Result<()> {
    let config = GeneratorConfig::from_args();

    println!(
        "Generating {} loads for {} customers in {}...",
        config.num_records, config.num_customers, config.output_path
    );

    if let Some(parent) = Path::new(&config.output_path).parent() {
        create_dir_all(parent)?;
    }

    let start = DateTime::parse_from_rfc3339("2000-01-01T00:00:00Z")
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidInput, error))?;

    let file = File::create(&config.output_path)?;
    let mut writer = io::BufWriter::new(file);
    let mut rng = rand::rng();
    let mut minutes = 0;

    for id in 1..=config.num_records {
        let customer_id = rng.random_range(1..=config.num_customers);

        // Loads arrive in time order, a few minutes apart on average.
        minutes = (minutes + rng.random_range(0..=(SPAN_MINUTES / config.num_records.max(1) as i64).max(1) * 2)).min(SPAN_MINUTES);
        let time = start + TimeDelta::minutes(minutes);

        if rng.random_bool(PROBABILITY_INVALID) {
            generate_invalid_record(&mut writer, &mut rng, id, customer_id)?;
            continue;
        }

        let cents = if rng.random_bool(PROBABILITY_LARGE_LOAD) {
            rng.random_range(500_000..2_500_000)
        } else {
            rng.random_range(100..300_000)
        };

        writeln!(
            writer,
            r#"{{"id":"{}","customer_id":"{}","load_amount":"${}.{:02}","time":"{}"}}"#,
            id, customer_id, cents / 100, cents % 100, time.format("%Y-%m-%dT%H:%M:%SZ")
        )?;

        if id % 100_000 == 0 {
            print!(".");
            stdout().flush()?;
        }
    }

    writer.flush()?;
    println!("\nGeneration complete.");

    Ok(())
}

fn generate_invalid_record<W: Write, R: Rng>(writer: &mut W, rng: &mut R, id: usize, customer_id: usize) -> io::Result<()> {
    let invalid_records = [
        format!(r#"{{"id":"{id}","customer_id":"{customer_id}","load_amount":"$12.00""#),
        format!(r#"{{"id":"{id}","customer_id":"{customer_id}","load_amount":"$abc","time":"2000-01-01T00:00:00Z"}}"#),
        format!(r#"{{"id":"{id}","load_amount":"$12.00","time":"2000-01-01T00:00:00Z"}}"#),
        format!(r#"{{"id":"{id}","customer_id":"{customer_id}","load_amount":"$12.00","time":"0001-01-01T00:00:00Z"}}"#),
        format!(r#"{{"id":"{id}","customer_id":"{customer_id}","load_amount":"$12.00","time":"yesterday"}}"#),
        "junk".to_string(),
    ];

    if let Some(record) = invalid_records.choose(rng) {
        writeln!(writer, "{}", record)?;
    }

    Ok(())
}
