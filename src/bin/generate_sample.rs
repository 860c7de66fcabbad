use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use facs_density::data::fcs::write_fcs;
use facs_density::data::model::{channel, EventTable, Metadata, MetadataValue};

/// Write a folder of synthetic FCS files for trying out the pipeline.
#[derive(Parser)]
struct Args {
    /// Output folder; one subfolder per plate
    #[arg(short = 'o', long = "output", default_value = "data")]
    output: PathBuf,
    /// Events per file
    #[arg(short = 'n', long = "events", default_value_t = 5_000)]
    events: usize,
    #[arg(long = "seed", default_value_t = 42)]
    seed: u64,
}

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5)).rotate_left(7).wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }

    fn log_normal(&mut self, median: f64, spread: f64) -> f64 {
        (median.ln() + self.gauss(0.0, spread)).exp()
    }
}

/// Plate, well, and the fold change over background for (FITC, Pacific Blue).
const WELLS: &[(&str, &str, f64, f64)] = &[
    ("Z1A9", "A1", 1.0, 1.0),
    ("Z1A9", "A2", 40.0, 5.0),
    ("Z1A9", "A3", 150.0, 20.0),
    ("Z2B4", "B1", 10.0, 80.0),
    ("Z2B4", "B2", 300.0, 300.0),
];

fn main() -> Result<()> {
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    for &(plate, well, fitc_fold, pb_fold) in WELLS {
        let mut fsc = Vec::with_capacity(args.events);
        let mut fitc = Vec::with_capacity(args.events);
        let mut pacific_blue = Vec::with_capacity(args.events);
        for _ in 0..args.events {
            let scatter = rng.log_normal(60_000.0, 0.35);
            fsc.push(scatter);
            fitc.push(scatter * 0.002208235 * fitc_fold * rng.log_normal(1.0, 0.25));
            pacific_blue.push(scatter * 0.011865047 * pb_fold * rng.log_normal(1.0, 0.25));
        }
        let table = EventTable::new(
            vec![
                channel::FSC.to_string(),
                channel::FITC.to_string(),
                channel::PACIFIC_BLUE.to_string(),
            ],
            vec![fsc, fitc, pacific_blue],
        )?;

        let mut extra = Metadata::new();
        extra.insert("$CYT".into(), MetadataValue::String("Synthetic".into()));
        extra.insert("$DATE".into(), MetadataValue::Date("16-OCT-2026".into()));
        extra.insert("$WELLID".into(), MetadataValue::String(well.into()));

        let dir = args.output.join(plate);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{plate}_{well}.fcs"));
        write_fcs(&path, &table, &extra)?;
        println!("Wrote {} events to {}", args.events, path.display());
    }
    Ok(())
}
