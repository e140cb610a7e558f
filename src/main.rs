use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use datacollect::data::query::sample_at;
use datacollect::{Experiment, ExperimentConfig, GeometryAxis, SmoothingMode, SmoothingSpec, Table};

fn usage() -> &'static str {
    "usage: datacollect <experiment.json> [--time SECONDS] [--window N]"
}

fn print_row(name: &str, t: f64, values: &[(datacollect::Label, f64)]) {
    let cells: Vec<String> = values.iter().map(|(l, v)| format!("{l}={v:.4}")).collect();
    println!("{name} @ {t}s: {}", cells.join("  "));
}

fn print_table(name: &str, table: &Table) {
    println!("{name}: {} × {}", table.n_rows(), table.n_cols());
    for (i, key) in table.index().iter().enumerate() {
        let cells: Vec<String> = table
            .columns()
            .iter()
            .map(|c| format!("{:.4}", c.values[i]))
            .collect();
        println!("  {key:>8.2} | {}", cells.join(" "));
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(config_path) = args.next().map(PathBuf::from) else {
        bail!(usage());
    };
    let mut time = None;
    let mut window = 1;
    while let Some(flag) = args.next() {
        let value = args.next().with_context(|| format!("{flag} needs a value"))?;
        match flag.as_str() {
            "--time" => time = Some(value.parse::<f64>().context("invalid --time")?),
            "--window" => window = value.parse::<usize>().context("invalid --window")?,
            _ => bail!(usage()),
        }
    }

    let config = ExperimentConfig::from_file(&config_path)
        .with_context(|| format!("Failed to read {}", config_path.display()))?;
    let experiment = Experiment::open(&config).context("Failed to open experiment")?;

    if let Some(sim) = &experiment.simulation {
        println!(
            "simulation: {} images, {} layers",
            sim.image_info().len(),
            sim.n_layers().unwrap_or(0)
        );
    }
    if let Some(mirex) = &experiment.mirex {
        println!("mirex: {} samples", mirex.raw().n_rows());
    }
    if let Some(temp) = &experiment.temparray {
        println!("temparray: {} samples × {} positions", temp.raw().n_rows(), temp.raw().n_cols());
    }

    let Some(t) = time else {
        return Ok(());
    };
    if let Some(sim) = &experiment.simulation {
        let spec = SmoothingSpec::trailing(window, SmoothingMode::Mean);
        for channel in 0..3 {
            let table = sim
                .extco_at_timestep(channel, t, GeometryAxis::Layer, &spec)
                .with_context(|| format!("extinction coefficients of channel {channel}"))?;
            print_table(&format!("extco channel {channel} @ {t}s"), &table);
        }
    }
    if let Some(mirex) = &experiment.mirex {
        let spec = mirex.smoothing(window, SmoothingMode::Mean);
        let series = mirex.series(&spec)?;
        print_row("mirex", t, &sample_at(&series, t, &SmoothingSpec::none())?);
    }
    if let Some(temp) = &experiment.temparray {
        let spec = temp.smoothing(window, SmoothingMode::Mean);
        let series = temp.series(&spec)?;
        print_row("temparray", t, &sample_at(&series, t, &SmoothingSpec::none())?);
    }
    Ok(())
}
