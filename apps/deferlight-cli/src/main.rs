use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use deferlight_render::{
    Camera, FrameOrchestrator, FrameReport, FrameSettings, PipelineResources, Projection,
    RecordingDevice, ShadingMode, ViewState, Viewport,
};
use deferlight_scene::{
    Attenuation, DemoMeshes, DemoScene, GLOBAL_RADIUS_SCALE, LightList, MeshHandle, MeshId,
    SceneConfig, cutoff_radius,
};
use glam::Vec3;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "deferlight-cli", about = "Headless tools for the deferred renderer")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Scene config (YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and pipeline constants
    Info,
    /// Cutoff radius of a point light
    Radius {
        /// Light color, red channel
        r: f32,
        g: f32,
        b: f32,
        #[arg(long, default_value = "1.0")]
        constant: f32,
        #[arg(long, default_value = "0.7")]
        linear: f32,
        #[arg(long, default_value = "1.8")]
        quadratic: f32,
        /// Apply the global light's radius scale
        #[arg(long)]
        global: bool,
    },
    /// List the demo scene's seeded lights
    Lights {
        #[arg(long)]
        json: bool,
    },
    /// Render one demo frame on the recording device
    Frame {
        #[arg(long, default_value = "1280")]
        width: u32,
        #[arg(long, default_value = "720")]
        height: u32,
        #[arg(long, default_value = "0")]
        mode: u32,
        #[arg(long)]
        show_local_lights: bool,
        /// Print the command stream instead of the report
        #[arg(long, conflicts_with = "json")]
        trace: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Serialize)]
struct LightRow {
    index: usize,
    global: bool,
    position: [f32; 3],
    color: [f32; 3],
    radius: f32,
}

fn light_rows(lights: &LightList) -> Vec<LightRow> {
    lights
        .iter()
        .enumerate()
        .map(|(index, light)| LightRow {
            index,
            global: lights.is_global(index),
            position: light.position.to_array(),
            color: light.color.to_array(),
            radius: lights.radius(index).unwrap_or(0.0),
        })
        .collect()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SceneConfig> {
    let Some(path) = path else {
        return Ok(SceneConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = SceneConfig::from_yaml_str(&text)
        .with_context(|| format!("parsing config {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded scene config");
    Ok(config)
}

/// Build the demo scene and render a single frame of it without a GPU.
fn render_demo_frame(
    config: &SceneConfig,
    viewport: Viewport,
    settings: &FrameSettings,
) -> anyhow::Result<(FrameReport, RecordingDevice)> {
    let mut device = RecordingDevice::new();
    let resources = PipelineResources::create(&mut device)?;
    let meshes = PipelineResources::upload_demo_meshes(&mut device)?;
    let demo = DemoScene::build(config, &meshes)?;
    let mut frames = FrameOrchestrator::new(&mut device, viewport, resources)?;

    let view = ViewState::from_camera(
        &Camera::default(),
        &Projection::default(),
        viewport,
        settings.mode,
    );
    let report = frames.render_frame(&mut device, &demo.graph, &view, viewport, settings)?;
    frames.destroy(&mut device);
    Ok((report, device))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info => {
            println!("deferlight-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("lights: max={}", deferlight_scene::MAX_LIGHTS);
            println!(
                "cutoff: threshold={:.5}, global radius scale={}, global marker scale={}",
                deferlight_scene::CUTOFF_THRESHOLD,
                GLOBAL_RADIUS_SCALE,
                deferlight_scene::GLOBAL_MARKER_SCALE
            );
            println!(
                "scene: seed={}, local lights={}",
                config.light_seed, config.local_light_count
            );
        }
        Commands::Radius {
            r,
            g,
            b,
            constant,
            linear,
            quadratic,
            global,
        } => {
            let attenuation = Attenuation {
                constant,
                linear,
                quadratic,
            };
            let mut radius = cutoff_radius(Vec3::new(r, g, b).max_element(), &attenuation);
            if global {
                radius *= GLOBAL_RADIUS_SCALE;
            }
            println!("{radius}");
        }
        Commands::Lights { json } => {
            let meshes = placeholder_meshes();
            let demo = DemoScene::build(&config, &meshes)?;
            let rows = light_rows(demo.graph.lights());
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for row in &rows {
                    println!(
                        "{:>3}{} pos=({:.2}, {:.2}, {:.2}) color=({:.2}, {:.2}, {:.2}) radius={:.3}",
                        row.index,
                        if row.global { "*" } else { " " },
                        row.position[0],
                        row.position[1],
                        row.position[2],
                        row.color[0],
                        row.color[1],
                        row.color[2],
                        row.radius
                    );
                }
            }
        }
        Commands::Frame {
            width,
            height,
            mode,
            show_local_lights,
            trace,
            json,
        } => {
            let settings = FrameSettings {
                mode: ShadingMode(mode),
                show_local_lights,
                key_light: config.key_light,
            };
            let (report, device) =
                render_demo_frame(&config, Viewport::new(width, height), &settings)?;
            if trace {
                print!("{}", device.trace());
            } else if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "frame {}: {:?}, {} geometry draws, {} lights, {} volumes",
                    report.frame,
                    report.outcome,
                    report.geometry_draws,
                    report.lights,
                    report.volume_draws
                );
            }
        }
    }

    Ok(())
}

/// Mesh handles for building the scene when nothing will be drawn.
fn placeholder_meshes() -> DemoMeshes {
    DemoMeshes {
        sphere: MeshHandle::Primitive(MeshId(0)),
        floor: MeshHandle::Procedural(MeshId(1)),
        bunny: MeshHandle::Loaded(MeshId(2)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deferlight_render::FrameOutcome;

    #[test]
    fn demo_frame_composites() {
        let (report, device) = render_demo_frame(
            &SceneConfig::default(),
            Viewport::new(64, 48),
            &FrameSettings::default(),
        )
        .unwrap();
        assert_eq!(report.outcome, FrameOutcome::Composited);
        assert_eq!(report.lights, 33);
        // Only the global marker without local volumes.
        assert_eq!(report.volume_draws, 1);
        assert!(device.trace().contains("blit_depth #1 64x48"));
        assert!(device.live_targets().is_empty());
    }

    #[test]
    fn zero_sized_frame_degrades() {
        let (report, _) = render_demo_frame(
            &SceneConfig::default(),
            Viewport::new(0, 0),
            &FrameSettings::default(),
        )
        .unwrap();
        assert_eq!(report.outcome, FrameOutcome::Degraded);
        assert_eq!(report.geometry_draws, 0);
    }

    #[test]
    fn light_rows_mark_the_global_light() {
        let demo = DemoScene::build(&SceneConfig::default(), &placeholder_meshes()).unwrap();
        let rows = light_rows(demo.graph.lights());
        assert_eq!(rows.len(), 33);
        assert_eq!(rows.iter().filter(|r| r.global).count(), 1);
        assert!(rows[32].global);
        assert!(rows.iter().all(|r| r.radius > 0.0));
        let json = serde_json::to_value(&rows).unwrap();
        assert_eq!(json[32]["global"], true);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/scene.yaml"))).is_err());
        assert_eq!(load_config(None).unwrap(), SceneConfig::default());
    }
}
