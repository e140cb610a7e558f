//! Writes a synthetic experiment: a simulation directory, a MIREX log, a
//! temperature-array log and an `experiment.json` tying them together.
//!
//! ```text
//! generate_sample [OUT_DIR]
//! ```

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use datacollect::config::ExperimentConfig;
use datacollect::data::calibration::LayerCalibration;
use datacollect::data::shift::TimeShift;
use datacollect::sources::images::{IMAGE_INFOS, LED_COORDINATES};
use datacollect::sources::simulation::EXTCO_DIR;
use log::info;
use parquet::arrow::ArrowWriter;

const N_IMAGES: usize = 60;
const IMAGE_INTERVAL: f64 = 5.0;
const N_LINES: u32 = 2;
const N_LAYERS: usize = 20;
const LEDS_PER_LINE: usize = 10;
const LAYER_BOTTOM: f64 = 0.2;
const LAYER_TOP: f64 = 3.2;

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

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Smoke layer descending from the ceiling: extinction grows with time and
/// height, weaker for longer wavelengths.
fn extinction(channel: u8, height: f64, t: f64) -> f64 {
    let interface = LAYER_TOP - 0.01 * t;
    let depth = (height - interface).max(0.0);
    depth * (1.0 - 0.25 * channel as f64)
}

fn layer_height(layer: usize) -> f64 {
    LayerCalibration::new(LAYER_BOTTOM, LAYER_TOP).height_from_layer(layer as f64, N_LAYERS)
}

fn write_file(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn write_image_infos(sim: &Path, times: &[f64]) -> Result<()> {
    let mut text = String::from("Name,Experiment_Time[s]\n");
    for (i, t) in times.iter().enumerate() {
        writeln!(text, "IMG_{:04}.png,{t}", i + 1)?;
    }
    write_file(&sim.join(IMAGE_INFOS), &text)?;

    let mut leds = String::from("index, pixel position x, pixel position y\n");
    for led in 0..LEDS_PER_LINE * N_LINES as usize {
        writeln!(leds, "{led},{},{}", 40 + 8 * led, 100)?;
    }
    write_file(&sim.join(LED_COORDINATES), &leds)
}

fn write_extco(sim: &Path, times: &[f64], rng: &mut SimpleRng) -> Result<()> {
    let dir = sim.join(EXTCO_DIR);
    std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for channel in 0..3u8 {
        for line in 0..N_LINES {
            let mut text = String::from("# absorption coefficients\n# numeric\n# sum_col_val\n#\n");
            let header: Vec<String> = (0..N_LAYERS).map(|l| l.to_string()).collect();
            writeln!(text, "{}", header.join(","))?;
            for &t in times {
                let row: Vec<String> = (0..N_LAYERS)
                    .map(|layer| {
                        let value = extinction(channel, layer_height(layer), t) + rng.gauss(0.0, 0.002);
                        format!("{value:.6}")
                    })
                    .collect();
                writeln!(text, "{}", row.join(","))?;
            }
            let name = format!("absorption_coefs_numeric_channel_{channel}_sum_col_val_led_array_{line}.csv");
            write_file(&dir.join(name), &text)?;
        }
    }
    Ok(())
}

fn write_led_params(sim: &Path, times: &[f64], rng: &mut SimpleRng) -> Result<()> {
    for channel in 0..3u8 {
        let mut img_id = Vec::new();
        let mut led_id = Vec::new();
        let mut line_col = Vec::new();
        let mut height = Vec::new();
        let mut sum_col_val = Vec::new();

        for (img, &t) in times.iter().enumerate() {
            for line in 0..N_LINES as usize {
                for i in 0..LEDS_PER_LINE {
                    let h = LAYER_BOTTOM + (LAYER_TOP - LAYER_BOTTOM) * i as f64 / (LEDS_PER_LINE - 1) as f64;
                    let transmission = (-extinction(channel, h, t)).exp();
                    img_id.push(img as i64);
                    led_id.push((line * LEDS_PER_LINE + i) as i64);
                    line_col.push(line as i64);
                    height.push(h);
                    sum_col_val.push(5000.0 * transmission + rng.gauss(0.0, 10.0));
                }
            }
        }

        let schema = Arc::new(Schema::new(vec![
            Field::new("img_id", DataType::Int64, false),
            Field::new("led_id", DataType::Int64, false),
            Field::new("line", DataType::Int64, false),
            Field::new("height", DataType::Float64, false),
            Field::new("sum_col_val", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(img_id)),
                Arc::new(Int64Array::from(led_id)),
                Arc::new(Int64Array::from(line_col)),
                Arc::new(Float64Array::from(height)),
                Arc::new(Float64Array::from(sum_col_val)),
            ],
        )
        .context("Failed to create RecordBatch")?;

        let dir = sim.join("analysis").join(format!("channel{channel}"));
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join("all_parameters.parquet");
        let file = std::fs::File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut writer = ArrowWriter::try_new(file, schema, None).context("Failed to create writer")?;
        writer.write(&batch).context("Failed to write batch")?;
        writer.close().context("Failed to close writer")?;
        info!("{}: {} rows", path.display(), batch.num_rows());
    }
    Ok(())
}

fn write_mirex(path: &Path, duration: f64, rng: &mut SimpleRng) -> Result<()> {
    let mut text = String::new();
    for i in 0..19 {
        writeln!(text, "# logger header {i}")?;
    }
    writeln!(text, "# Time : ;  Sample\tMIREX    \tMirex 2  \tMirex 3  \tBalance")?;
    let mut balance = 1500.0;
    for s in 0..duration as usize {
        let t = s as f64;
        let smoke = 0.01 * t;
        balance -= 0.05 + rng.gauss(0.0, 0.005);
        writeln!(
            text,
            "{t}\t{:.4}\t{:.4}\t{:.4}\t{balance:.3}",
            10.0 + smoke + rng.gauss(0.0, 0.05),
            10.0 / (1.0 + smoke),
            10.0 / (1.0 + 0.8 * smoke),
        )?;
    }
    write_file(path, &text)
}

fn write_temparray(path: &Path, duration: f64, rng: &mut SimpleRng) -> Result<()> {
    let start_ms = 1_700_000_000_000i64;
    let mut text = String::new();
    for s in 0..duration as i64 {
        let readings: Vec<String> = (0..8)
            .map(|p| format!("{:.2}", 20.0 + 0.02 * s as f64 * (p + 1) as f64 / 8.0 + rng.gauss(0.0, 0.1)))
            .collect();
        writeln!(text, "{};T;{}", start_ms + s * 1000, readings.join(";"))?;
    }
    write_file(path, &text)
}

fn main() -> Result<()> {
    env_logger::init();

    let out = std::env::args().nth(1).unwrap_or_else(|| "sample_experiment".to_string());
    let out = Path::new(&out);
    let sim = out.join("simulation");
    std::fs::create_dir_all(sim.join("analysis"))
        .with_context(|| format!("Failed to create {}", sim.display()))?;

    let mut rng = SimpleRng::new(42);
    let times: Vec<f64> = (0..N_IMAGES).map(|i| i as f64 * IMAGE_INTERVAL).collect();
    let duration = N_IMAGES as f64 * IMAGE_INTERVAL;

    write_image_infos(&sim, &times)?;
    write_extco(&sim, &times, &mut rng)?;
    write_led_params(&sim, &times, &mut rng)?;
    write_mirex(&out.join("mirex.txt"), duration, &mut rng)?;
    write_temparray(&out.join("temparray.csv"), duration, &mut rng)?;

    let mut config = ExperimentConfig {
        simulation: Some("simulation".into()),
        mirex: Some("mirex.txt".into()),
        temparray: Some("temparray.csv".into()),
        layers: Some(LayerCalibration::new(LAYER_BOTTOM, LAYER_TOP)),
        ..ExperimentConfig::default()
    };
    config.shifts.mirex = TimeShift::autocorrected(-2.0);
    let json = serde_json::to_string_pretty(&config).context("Failed to serialize config")?;
    write_file(&out.join("experiment.json"), &json)?;

    println!(
        "Wrote {N_IMAGES} time steps, {} extinction files and 3 LED tables to {}",
        3 * N_LINES,
        out.display()
    );
    Ok(())
}
