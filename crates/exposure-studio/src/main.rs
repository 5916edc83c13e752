//! Headless harness: evaluates the exposure of a demo plane once, logs the
//! per-part breakdown and writes the debug images.

mod demo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use exposure_engine::ExposureConfig;
use exposure_engine::device::{DevicePreference, Gpu, GpuInit};
use exposure_engine::evaluator::{Evaluator, RenderResult};
use exposure_engine::logging::{LoggingConfig, init_logging};
use exposure_engine::vehicle::{AIRSTREAM, FlightState, SUN, VehicleExposure};
use glam::{Mat4, Vec3};

use demo::Part;

/// Ticks to wait for GPU readbacks before giving up.
const MAX_TICKS: usize = 600;

/// Evaluates the exposure of a demo plane and writes debug images.
#[derive(Parser, Debug)]
#[command(name = "exposure-studio", version, about)]
struct Args {
    /// Directory receiving airstream.png and sun.png
    #[arg(default_value = ".")]
    output: PathBuf,

    /// Count on the CPU even when a GPU is available
    #[arg(long)]
    cpu: bool,

    /// TrueType/OpenType font used to label the debug images
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,
}

fn evaluator(cpu: bool) -> Evaluator<Part> {
    if cpu {
        return Evaluator::software();
    }
    match Gpu::new_blocking(GpuInit::default()) {
        Ok(gpu) => {
            let info = gpu.adapter_info();
            log::info!(
                "using {} ({:?}), compute: {}",
                info.name,
                info.backend,
                gpu.supports_compute()
            );
            Evaluator::with_gpu(&gpu)
        }
        Err(err) => {
            log::warn!("no GPU available ({err:#}); counting on the CPU");
            Evaluator::software()
        }
    }
}

fn report(label: &str, result: &RenderResult<Part>) {
    let frame = result.frame_area();
    log::info!(
        "{label}: {:?} via {:?}, {:.3} m2 of {:.3} m2 frame",
        result.outcome,
        result.device,
        result.total_area(),
        frame
    );
    for (part, area) in result.sorted_areas() {
        let pct = if frame > 0.0 { area / frame * 100.0 } else { 0.0 };
        log::info!("  {part:<12} {area:>8.3} m2 {pct:>5.1}%");
    }
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    let args = Args::parse();

    let config = ExposureConfig {
        device: if args.cpu { DevicePreference::Cpu } else { DevicePreference::PreferGpu },
        ..ExposureConfig::default()
    };
    let mut vehicle = VehicleExposure::new(config, evaluator(args.cpu));

    let rejected = vehicle.reset_parts(demo::plane());
    anyhow::ensure!(rejected.is_empty(), "parts without a color: {rejected:?}");

    for target in [AIRSTREAM, SUN] {
        vehicle.enable_debug(target);
        if let Some(path) = &args.font {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read font {}", path.display()))?;
            if let Some(debugger) = vehicle.evaluator_mut().debugger_mut(target) {
                debugger.load_font(&bytes)?;
            }
        }
    }

    // Climbing at 10 degrees with the sun low over the left wing.
    let state = FlightState {
        velocity: Vec3::new(0.0, 0.17, 0.98) * 120.0,
        atmosphere_density: 1.1,
        sun_position: Some(Vec3::new(-4000.0, 2500.0, 1000.0)),
        local_to_world: Mat4::IDENTITY,
    };

    let mut ticks = 0;
    while vehicle.airstream().is_none() || vehicle.sun().is_none() {
        anyhow::ensure!(ticks < MAX_TICKS, "no result after {MAX_TICKS} ticks");
        vehicle.update(&state);
        ticks += 1;
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    log::info!("results after {ticks} ticks");

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create {}", args.output.display()))?;

    for (name, target) in [("airstream", AIRSTREAM), ("sun", SUN)] {
        if let Some(result) = vehicle.latest(target) {
            report(name, result);
        }
        if let Some(debugger) = vehicle.debugger(target) {
            let path = args.output.join(format!("{name}.png"));
            debugger
                .save_png(&path, false)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
    }

    vehicle.shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(std::iter::once("exposure-studio").chain(argv.iter().copied()))
    }

    #[test]
    fn defaults_to_current_directory_and_gpu() {
        let args = parse(&[]).unwrap();
        assert_eq!(args.output, PathBuf::from("."));
        assert!(!args.cpu);
        assert!(args.font.is_none());
    }

    #[test]
    fn reads_output_and_flags() {
        let args = parse(&["out/run1", "--cpu", "--font", "fonts/mono.ttf"]).unwrap();
        assert_eq!(args.output, PathBuf::from("out/run1"));
        assert!(args.cpu);
        assert_eq!(args.font, Some(PathBuf::from("fonts/mono.ttf")));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(parse(&["--gpu"]).is_err());
    }

    #[test]
    fn font_needs_a_path() {
        assert!(parse(&["--font"]).is_err());
    }
}
