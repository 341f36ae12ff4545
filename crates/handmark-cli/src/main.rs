use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use handmark_core::{HandDetector, ModelComplexity};
use handmark_hw::{device_path, Camera, Frame};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod display;

use capture::CaptureContext;
use config::Config;
use display::{FrameSink, HeadlessSink, WindowSink, WINDOW_TITLE};

#[derive(Parser)]
#[command(name = "handmark", about = "Hand landmark detection from a webcam")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Live demo: print the wrist of the first hand and show annotated frames
    Run(RunArgs),
    /// Detect hands in a single image file
    Detect(DetectArgs),
    /// List V4L2 capture devices
    Devices,
}

/// Model and detector settings shared by `run` and `detect`.
#[derive(Args, Default)]
struct DetectorArgs {
    /// TOML config file (default: $HANDMARK_CONFIG)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Directory containing the ONNX models
    #[arg(long)]
    model_dir: Option<PathBuf>,
    /// Maximum number of hands to detect
    #[arg(long)]
    max_hands: Option<usize>,
    /// Landmark model tier: 0 (lite) or 1 (full)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=1))]
    model_complexity: Option<u8>,
    #[arg(long)]
    min_detection_confidence: Option<f32>,
    #[arg(long)]
    min_tracking_confidence: Option<f32>,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Camera index (/dev/videoN)
    #[arg(long)]
    device: Option<u32>,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Do not open a window
    #[arg(long)]
    no_display: bool,
    /// Stop after N frames
    #[arg(long)]
    frames: Option<u64>,
    /// Detect palms on every frame instead of tracking
    #[arg(long)]
    static_image_mode: bool,
    #[command(flatten)]
    detector: DetectorArgs,
}

#[derive(Args)]
struct DetectArgs {
    /// Input image
    image: PathBuf,
    /// Write the annotated, mirrored image here
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Print hands as JSON
    #[arg(long)]
    json: bool,
    #[command(flatten)]
    detector: DetectorArgs,
}

impl DetectorArgs {
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).context("failed to load config")?;
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        if let Some(n) = self.max_hands {
            config.detector.max_num_hands = n;
        }
        if let Some(c) = self.model_complexity {
            config.detector.model_complexity =
                ModelComplexity::try_from(c).map_err(anyhow::Error::msg)?;
        }
        if let Some(v) = self.min_detection_confidence {
            config.detector.min_detection_confidence = v;
        }
        if let Some(v) = self.min_tracking_confidence {
            config.detector.min_tracking_confidence = v;
        }
        Ok(config)
    }
}

impl RunArgs {
    fn load_config(&self) -> Result<Config> {
        let mut config = self.detector.load_config()?;
        if let Some(index) = self.device {
            config.camera_index = index;
        }
        if let Some(w) = self.width {
            config.width = w;
        }
        if let Some(h) = self.height {
            config.height = h;
        }
        if self.no_display {
            config.display = false;
        }
        if self.frames.is_some() {
            config.max_frames = self.frames;
        }
        if self.static_image_mode {
            config.detector.static_image_mode = true;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(&args.load_config()?),
        Commands::Detect(args) => detect(&args),
        Commands::Devices => {
            list_devices();
            Ok(())
        }
    }
}

fn run(config: &Config) -> Result<()> {
    let path = device_path(config.camera_index);
    let camera = Camera::open(&path, config.width, config.height)
        .with_context(|| format!("failed to open camera {path}"))?;
    tracing::info!(
        device = %path,
        width = camera.width,
        height = camera.height,
        format = ?camera.pixel_format(),
        "camera ready"
    );

    let detector = HandDetector::load(&config.model_dir, config.detector.clone(), config.tensor_layout)
        .context("failed to load hand detector")?;

    let stream = camera.stream().context("failed to start camera stream")?;
    let sink: Box<dyn FrameSink> = if config.display {
        Box::new(WindowSink::new(WINDOW_TITLE))
    } else {
        Box::new(HeadlessSink)
    };

    let mut ctx = CaptureContext::new(Box::new(stream), detector, sink, config.max_frames);
    let mut out = std::io::stdout().lock();
    ctx.run(&mut out).context("capture loop failed")?;
    Ok(())
}

fn detect(args: &DetectArgs) -> Result<()> {
    let mut config = args.detector.load_config()?;
    config.detector.static_image_mode = true;

    let image = image::open(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?
        .into_rgb8();
    let mut frame = Frame::from_image(image);

    let mut detector = HandDetector::load(&config.model_dir, config.detector.clone(), config.tensor_layout)
        .context("failed to load hand detector")?;
    let hands = detector.find_hands(&mut frame, true, true)?;
    tracing::info!(hands = hands.len(), image = %args.image.display(), "detection finished");
    for hand in &hands {
        tracing::debug!(handedness = ?hand.handedness(), wrist = %hand.wrist(), "hand");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hands)?);
    } else {
        for hand in &hands {
            for landmark in hand.iter() {
                println!("{landmark}");
            }
        }
    }

    if let Some(output) = &args.output {
        save_image(&frame, output)?;
    }
    Ok(())
}

fn save_image(frame: &Frame, path: &Path) -> Result<()> {
    frame
        .image
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::debug!(path = %path.display(), "annotated image written");
    Ok(())
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No capture devices found");
        return;
    }
    for dev in devices {
        println!("{}\t{} ({}, {})", dev.path, dev.card, dev.driver, dev.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_flags_override_config() {
        let cli = Cli::try_parse_from([
            "handmark",
            "run",
            "--device",
            "3",
            "--no-display",
            "--frames",
            "20",
            "--static-image-mode",
            "--max-hands",
            "1",
            "--model-complexity",
            "1",
            "--model-dir",
            "/tmp/models",
        ])
        .unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };

        let config = args.load_config().unwrap();

        assert_eq!(config.camera_index, 3);
        assert!(!config.display);
        assert_eq!(config.max_frames, Some(20));
        assert!(config.detector.static_image_mode);
        assert_eq!(config.detector.max_num_hands, 1);
        assert_eq!(config.detector.model_complexity, ModelComplexity::Full);
        assert_eq!(config.model_dir, PathBuf::from("/tmp/models"));
    }

    #[test]
    fn test_model_complexity_range() {
        assert!(Cli::try_parse_from(["handmark", "run", "--model-complexity", "2"]).is_err());
    }

    #[test]
    fn test_no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["handmark"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_detect_args() {
        let cli = Cli::try_parse_from(["handmark", "detect", "hand.png", "-o", "out.png", "--json"]).unwrap();
        let Some(Commands::Detect(args)) = cli.command else {
            panic!("expected detect subcommand");
        };
        assert_eq!(args.image, PathBuf::from("hand.png"));
        assert_eq!(args.output, Some(PathBuf::from("out.png")));
        assert!(args.json);
    }
}
